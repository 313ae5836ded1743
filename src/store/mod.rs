//! Durable record of jobs.
//!
//! The engine only reads through [`JobStore::find_eligible_for_acquired_or_pending`]
//! and [`JobStore::count_published_since`], and only writes through
//! [`JobStore::compare_and_set_state`]. Every write is a single-record update
//! guarded by the state the caller last observed.
//!
//! Processes sharing one store take turns through a single queue lease
//! ([`JobStore::claim_lease`]); a cycle or a recovery runs only while its
//! owner holds it.

#[cfg(test)]
mod memory;
mod sqlite;

#[cfg(test)]
pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::state_machine::{Job, JobState, JobUpdate, NewJob};

/// How long a claimed lease stays valid without renewal.
pub const LEASE_TTL: Duration = Duration::from_secs(120);

/// Result of [`JobStore::claim_lease`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseClaim {
    Granted,
    Held {
        owner: String,
        expires_at: DateTime<Utc>,
    },
}

/// Lease owner name for this process, e.g. `pid 4242 cycle 1a2b3c4d`.
pub fn lease_owner(role: &str) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    format!("pid {} {role} {}", std::process::id(), &tag[..8])
}

pub trait JobStore {
    /// Insert a new `Pending` job with a fresh id and the next creation sequence.
    async fn insert(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// All jobs in creation order.
    async fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// The next job to drive: the earliest `Acquired` job, otherwise the earliest `Pending` one.
    async fn find_eligible_for_acquired_or_pending(&self) -> Result<Option<Job>, StoreError>;

    /// Number of `Published` jobs with `published_at >= since`.
    async fn count_published_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError>;

    /// Write `update` only if the job is still in `expected`.
    ///
    /// Returns the record as written, or [`StoreError::PreconditionConflict`]
    /// when another writer moved the job first. Nothing is written on conflict.
    async fn compare_and_set_state(
        &self,
        id: &str,
        expected: JobState,
        update: JobUpdate,
    ) -> Result<Job, StoreError>;

    /// Published jobs whose local artifact has not been cleaned up yet.
    async fn find_published_with_artifact(&self) -> Result<Vec<Job>, StoreError>;

    /// Claim the queue lease for `owner` until `ttl` from now.
    ///
    /// Granted when the lease is free, expired, or already held by `owner`
    /// (which renews it); otherwise reports the current holder.
    async fn claim_lease(&self, owner: &str, ttl: Duration) -> Result<LeaseClaim, StoreError>;

    /// Drop the lease if `owner` still holds it.
    async fn release_lease(&self, owner: &str) -> Result<(), StoreError>;
}

fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
