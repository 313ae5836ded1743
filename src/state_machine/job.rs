use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;

/// Payload accepted by the enqueue interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub source_reference: String,
    pub title: Option<String>,
    pub description_seed: Option<String>,
}

impl NewJob {
    pub fn new(source_reference: impl Into<String>) -> Self {
        Self {
            source_reference: source_reference.into(),
            title: None,
            description_seed: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, seed: impl Into<String>) -> Self {
        self.description_seed = Some(seed.into());
        self
    }
}

/// A single video moving through acquisition and publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Creation sequence; selection order among jobs in the same state.
    pub seq: i64,
    pub source_reference: String,
    pub title: Option<String>,
    pub description_seed: Option<String>,
    pub state: JobState,
    pub local_artifact: Option<PathBuf>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh `Pending` job with a new id. Stores assign `seq`.
    pub fn from_new(new: NewJob, seq: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            seq,
            source_reference: new.source_reference,
            title: new.title,
            description_seed: new.description_seed,
            state: JobState::Pending,
            local_artifact: None,
            published_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// First eight characters of the id, for log lines and listings.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// How a single optional field is touched by an update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone> FieldUpdate<T> {
    fn apply(&self, field: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *field = Some(value.clone()),
            FieldUpdate::Clear => *field = None,
        }
    }
}

/// The field set written by one compare-and-set on a job record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub state: JobState,
    pub local_artifact: FieldUpdate<PathBuf>,
    /// Only ever `Some` for the transition into `Published`.
    pub published_at: Option<DateTime<Utc>>,
    pub last_error: FieldUpdate<String>,
}

impl JobUpdate {
    pub fn to(state: JobState) -> Self {
        Self {
            state,
            local_artifact: FieldUpdate::Keep,
            published_at: None,
            last_error: FieldUpdate::Keep,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            last_error: FieldUpdate::Set(reason.to_string()),
            ..Self::to(JobState::Failed)
        }
    }

    /// Apply the update to an in-memory record. `published_at` is never overwritten.
    pub fn apply_to(&self, job: &mut Job, now: DateTime<Utc>) {
        job.state = self.state;
        self.local_artifact.apply(&mut job.local_artifact);
        self.last_error.apply(&mut job.last_error);
        if job.published_at.is_none() {
            job.published_at = self.published_at;
        }
        job.updated_at = now;
    }
}

/// Bounded retry for deleting a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupPolicy {
    /// Total deletion attempts within one cycle.
    pub attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl CleanupPolicy {
    /// Largest accepted `attempts`.
    pub const MAX_ATTEMPTS: u32 = 10;

    /// Delay before retry `attempt` (1-based).
    /// delay = min(base_delay_ms * 2^(attempt - 1), max_delay_ms)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 2u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = Job::from_new(
            NewJob::new("https://youtu.be/abc").with_title("Cats"),
            7,
        );
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.seq, 7);
        assert_eq!(job.title.as_deref(), Some("Cats"));
        assert!(job.local_artifact.is_none());
        assert!(job.published_at.is_none());
        assert!(job.last_error.is_none());
        assert_eq!(job.short_id().len(), 8);
    }

    #[test]
    fn ids_are_unique() {
        let a = Job::from_new(NewJob::new("a"), 1);
        let b = Job::from_new(NewJob::new("a"), 2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn cleanup_policy_exponential_backoff() {
        let policy = CleanupPolicy {
            attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for_attempt(1), 100);
        assert_eq!(policy.delay_for_attempt(2), 200);
        assert_eq!(policy.delay_for_attempt(3), 400);
        assert_eq!(policy.delay_for_attempt(5), 1_000);
    }

    #[test]
    fn cleanup_delay_saturates_instead_of_overflowing() {
        let policy = CleanupPolicy {
            attempts: 70,
            base_delay_ms: 250,
            ..CleanupPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(70), policy.max_delay_ms);
        assert_eq!(policy.delay_for_attempt(u32::MAX), policy.max_delay_ms);

        let zero = CleanupPolicy {
            base_delay_ms: 0,
            ..policy
        };
        assert_eq!(zero.delay_for_attempt(70), 0);
    }

    #[test]
    fn update_never_overwrites_published_at() {
        let mut job = Job::from_new(NewJob::new("a"), 1);
        let first = Utc::now();
        job.published_at = Some(first);

        let update = JobUpdate {
            published_at: Some(first + chrono::Duration::hours(1)),
            ..JobUpdate::to(JobState::Published)
        };
        update.apply_to(&mut job, Utc::now());
        assert_eq!(job.published_at, Some(first));
    }

    #[test]
    fn field_updates_keep_set_and_clear() {
        let mut job = Job::from_new(NewJob::new("a"), 1);
        job.last_error = Some("old".into());

        JobUpdate::to(JobState::Acquiring).apply_to(&mut job, Utc::now());
        assert_eq!(job.last_error.as_deref(), Some("old"));

        JobUpdate::failed("new").apply_to(&mut job, Utc::now());
        assert_eq!(job.last_error.as_deref(), Some("new"));

        let clear = JobUpdate {
            last_error: FieldUpdate::Clear,
            ..JobUpdate::to(JobState::Pending)
        };
        clear.apply_to(&mut job, Utc::now());
        assert!(job.last_error.is_none());
    }

    #[test]
    fn job_serialization_uses_snake_case_state() {
        let job = Job::from_new(NewJob::new("https://youtu.be/abc"), 1);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "pending");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
