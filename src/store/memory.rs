use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{JobStore, LeaseClaim, lease_expiry};
use crate::error::StoreError;
use crate::state_machine::{Job, JobState, JobUpdate, NewJob};

#[derive(Debug, Default)]
struct MemoryState {
    jobs: Vec<Job>,
    next_seq: i64,
    lease: Option<(String, DateTime<Utc>)>,
}

/// Process-local job store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    async fn insert(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut state = self.inner.lock().await;
        state.next_seq += 1;
        let job = Job::from_new(new, state.next_seq);
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.inner.lock().await;
        let mut jobs = state.jobs.clone();
        jobs.sort_by_key(|job| job.seq);
        Ok(jobs)
    }

    async fn find_eligible_for_acquired_or_pending(&self) -> Result<Option<Job>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.state.is_eligible())
            .min_by_key(|job| selection_key(job))
            .cloned())
    }

    async fn count_published_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError> {
        let state = self.inner.lock().await;
        let count = state
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Published)
            .filter(|job| job.published_at.is_some_and(|at| at >= since))
            .count();
        Ok(count as u32)
    }

    async fn compare_and_set_state(
        &self,
        id: &str,
        expected: JobState,
        update: JobUpdate,
    ) -> Result<Job, StoreError> {
        let mut state = self.inner.lock().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if job.state != expected {
            return Err(StoreError::PreconditionConflict {
                id: id.to_string(),
                expected,
                actual: job.state,
            });
        }

        update.apply_to(job, Utc::now());
        Ok(job.clone())
    }

    async fn find_published_with_artifact(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Published && job.local_artifact.is_some())
            .cloned()
            .collect())
    }

    async fn claim_lease(&self, owner: &str, ttl: Duration) -> Result<LeaseClaim, StoreError> {
        let mut state = self.inner.lock().await;
        let now = Utc::now();
        if let Some((holder, expires_at)) = &state.lease
            && holder != owner
            && *expires_at > now
        {
            return Ok(LeaseClaim::Held {
                owner: holder.clone(),
                expires_at: *expires_at,
            });
        }
        state.lease = Some((owner.to_string(), lease_expiry(now, ttl)));
        Ok(LeaseClaim::Granted)
    }

    async fn release_lease(&self, owner: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if state.lease.as_ref().is_some_and(|(holder, _)| holder == owner) {
            state.lease = None;
        }
        Ok(())
    }
}

/// `Acquired` before `Pending`, then creation sequence.
fn selection_key(job: &Job) -> (u8, i64) {
    let rank = match job.state {
        JobState::Acquired => 0,
        _ => 1,
    };
    (rank, job.seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{StateMachine, Transition};

    async fn move_to(store: &MemoryJobStore, job: &Job, transition: Transition) -> Job {
        let update = StateMachine::plan(job, transition).unwrap();
        store
            .compare_and_set_state(&job.id, job.state, update)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_increasing_sequence() {
        let store = MemoryJobStore::new();
        let a = store.insert(NewJob::new("a")).await.unwrap();
        let b = store.insert(NewJob::new("b")).await.unwrap();
        assert!(a.seq < b.seq);
        assert_eq!(a.state, JobState::Pending);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id);
    }

    #[tokio::test]
    async fn selection_prefers_acquired_then_earliest() {
        let store = MemoryJobStore::new();
        let first = store.insert(NewJob::new("first")).await.unwrap();
        let second = store.insert(NewJob::new("second")).await.unwrap();

        let next = store.find_eligible_for_acquired_or_pending().await.unwrap();
        assert_eq!(next.unwrap().id, first.id);

        let second = move_to(&store, &second, Transition::BeginAcquisition).await;
        move_to(
            &store,
            &second,
            Transition::Acquired {
                artifact: "media/b.mp4".into(),
            },
        )
        .await;

        let next = store.find_eligible_for_acquired_or_pending().await.unwrap();
        assert_eq!(next.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn failed_jobs_are_never_selected() {
        let store = MemoryJobStore::new();
        let job = store.insert(NewJob::new("a")).await.unwrap();
        let job = move_to(&store, &job, Transition::BeginAcquisition).await;
        move_to(
            &store,
            &job,
            Transition::AcquisitionFailed {
                reason: "gone".into(),
            },
        )
        .await;

        assert!(store.find_eligible_for_acquired_or_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_state() {
        let store = MemoryJobStore::new();
        let job = store.insert(NewJob::new("a")).await.unwrap();
        move_to(&store, &job, Transition::BeginAcquisition).await;

        let update = StateMachine::plan(&job, Transition::BeginAcquisition).unwrap();
        let err = store
            .compare_and_set_state(&job.id, JobState::Pending, update)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Acquiring);
    }

    #[tokio::test]
    async fn compare_and_set_unknown_job() {
        let store = MemoryJobStore::new();
        let err = store
            .compare_and_set_state("nope", JobState::Pending, JobUpdate::to(JobState::Acquiring))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn counts_only_published_inside_window() {
        let store = MemoryJobStore::new();
        let job = store.insert(NewJob::new("a")).await.unwrap();
        let job = move_to(&store, &job, Transition::BeginAcquisition).await;
        let job = move_to(&store, &job, Transition::Acquired { artifact: "a.mp4".into() }).await;
        let job = move_to(&store, &job, Transition::BeginPublication).await;
        let at = Utc::now();
        move_to(&store, &job, Transition::Published { at }).await;
        store.insert(NewJob::new("b")).await.unwrap();

        assert_eq!(store.count_published_since(at).await.unwrap(), 1);
        let later = at + chrono::Duration::seconds(1);
        assert_eq!(store.count_published_since(later).await.unwrap(), 0);

        let leftovers = store.find_published_with_artifact().await.unwrap();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released_or_expired() {
        let store = MemoryJobStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.claim_lease("a", ttl).await.unwrap(), LeaseClaim::Granted);
        assert_eq!(store.claim_lease("a", ttl).await.unwrap(), LeaseClaim::Granted);
        assert!(matches!(
            store.claim_lease("b", ttl).await.unwrap(),
            LeaseClaim::Held { ref owner, .. } if owner == "a"
        ));

        // Releasing someone else's lease does nothing.
        store.release_lease("b").await.unwrap();
        assert!(matches!(store.claim_lease("b", ttl).await.unwrap(), LeaseClaim::Held { .. }));

        store.release_lease("a").await.unwrap();
        assert_eq!(store.claim_lease("b", Duration::ZERO).await.unwrap(), LeaseClaim::Granted);
        // An expired lease is up for grabs.
        assert_eq!(store.claim_lease("a", ttl).await.unwrap(), LeaseClaim::Granted);
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = MemoryJobStore::new();
        let other = store.clone();
        let job = store.insert(NewJob::new("a")).await.unwrap();
        assert!(other.get(&job.id).await.unwrap().is_some());
    }
}
