//! Operator actions on the queue: enqueue, re-enqueue of failed jobs and
//! recovery of jobs left in flight by an interrupted process.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::acquisition::remove_job_files;
use crate::error::AdminError;
use crate::state_machine::{Job, JobState, NewJob, StateMachine, Transition};
use crate::store::{JobStore, LEASE_TTL, LeaseClaim, lease_owner};

/// Insert a new `Pending` job. The source reference is trimmed and must not be empty.
pub async fn enqueue<S: JobStore>(store: &S, mut new: NewJob) -> Result<Job, AdminError> {
    new.source_reference = new.source_reference.trim().to_string();
    if new.source_reference.is_empty() {
        return Err(AdminError::EmptySource);
    }
    let job = store.insert(new).await?;
    info!(job = job.short_id(), source = %job.source_reference, "Enqueued");
    Ok(job)
}

/// Enqueue one job per line. Blank lines and `#` comments are skipped.
pub async fn enqueue_bulk<S, I>(store: &S, lines: I) -> Result<Vec<Job>, AdminError>
where
    S: JobStore,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut jobs = Vec::new();
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        jobs.push(enqueue(store, NewJob::new(line)).await?);
    }
    Ok(jobs)
}

/// Put a `Failed` job back in the queue as `Pending`.
///
/// The artifact preserved by a failed publication and any partial download
/// in `media_dir` are deleted, since the job will be acquired again from
/// scratch.
pub async fn requeue<S: JobStore>(store: &S, id: &str, media_dir: &Path) -> Result<Job, AdminError> {
    let job = find(store, id).await?;
    let update = StateMachine::plan(&job, Transition::Requeue)?;
    let requeued = store.compare_and_set_state(&job.id, job.state, update).await?;

    if let Some(artifact) = job.local_artifact.as_deref()
        && let Err(e) = tokio::fs::remove_file(artifact).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(job = job.short_id(), path = %artifact.display(), error = %e, "Could not delete preserved artifact");
    }
    discard_job_files(&requeued, media_dir).await;

    info!(job = requeued.short_id(), "Requeued");
    Ok(requeued)
}

/// Reset every job stuck in `Acquiring` or `Publishing`, returning each
/// recovered job with the state it was stuck in.
///
/// Holds the queue lease throughout, so it refuses to run while a cycle is
/// in progress in any process. A job stuck in `Publishing` with an artifact
/// goes back to `Acquired`, so an upload that actually completed before the
/// interruption is published a second time. Jobs sent back to `Pending` lose
/// their partial files in `media_dir`.
pub async fn recover<S: JobStore>(store: &S, media_dir: &Path) -> Result<Vec<(JobState, Job)>, AdminError> {
    let owner = lease_owner("recover");
    if let LeaseClaim::Held { owner, .. } = store.claim_lease(&owner, LEASE_TTL).await? {
        return Err(AdminError::QueueBusy { owner });
    }
    let result = reset_in_flight(store, media_dir).await;
    if let Err(e) = store.release_lease(&owner).await {
        warn!(error = %e, "Could not release queue lease; it will expire");
    }
    result
}

async fn reset_in_flight<S: JobStore>(store: &S, media_dir: &Path) -> Result<Vec<(JobState, Job)>, AdminError> {
    let mut recovered = Vec::new();
    for job in store.list().await? {
        if !job.state.is_in_flight() {
            continue;
        }
        let update = StateMachine::plan(&job, Transition::Recover)?;
        match store.compare_and_set_state(&job.id, job.state, update).await {
            Ok(next) => {
                info!(job = next.short_id(), from = %job.state, to = %next.state, "Recovered");
                if next.state == JobState::Pending {
                    discard_job_files(&next, media_dir).await;
                }
                recovered.push((job.state, next));
            }
            Err(e) if e.is_conflict() => {
                warn!(job = job.short_id(), error = %e, "Job moved during recovery; left as is");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(recovered)
}

async fn discard_job_files(job: &Job, media_dir: &Path) {
    match remove_job_files(media_dir, &job.id).await {
        Ok(0) => {}
        Ok(removed) => debug!(job = job.short_id(), removed, "Removed leftover downloads"),
        Err(e) => {
            warn!(job = job.short_id(), dir = %media_dir.display(), error = %e, "Could not remove leftover downloads");
        }
    }
}

/// Look a job up by full id or by a unique prefix (as shown in listings).
pub async fn find<S: JobStore>(store: &S, id: &str) -> Result<Job, AdminError> {
    if let Some(job) = store.get(id).await? {
        return Ok(job);
    }
    let mut matches = store
        .list()
        .await?
        .into_iter()
        .filter(|job| !id.is_empty() && job.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(job), None) => Ok(job),
        _ => Err(AdminError::JobNotFound(id.to_string())),
    }
}
