use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, error, info, warn};

use crate::acquisition::Acquirer;
use crate::config::QueueConfig;
use crate::error::{EngineError, PublicationError, StoreError};
use crate::metadata::MetadataTemplate;
use crate::publication::Publisher;
use crate::quota::QuotaLedger;
use crate::state_machine::{CleanupPolicy, Job, JobState, StateMachine, Transition};
use crate::store::{JobStore, LEASE_TTL, LeaseClaim, lease_owner};

/// Lease renewal period while a cycle runs.
const LEASE_RENEWAL: Duration = Duration::from_secs(30);

/// Knobs the engine needs beyond its injected collaborators.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub daily_limit: u32,
    pub template: MetadataTemplate,
    pub cleanup: CleanupPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            daily_limit: config.daily_limit,
            template: config.metadata.clone(),
            cleanup: config.cleanup.clone(),
        }
    }
}

/// Result of one call to [`QueueEngine::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    QuotaExhausted { published_today: u32, daily_limit: u32 },
    QueueEmpty,
    JobSucceeded { id: String },
    JobFailed { id: String, reason: String },
}

/// Drives at most one job per cycle through acquisition and publication.
pub struct QueueEngine<S, A, P> {
    store: S,
    acquirer: A,
    publisher: P,
    settings: EngineSettings,
    /// Held for the whole cycle; a second caller is turned away, not queued.
    running: Mutex<()>,
    /// Name under which this engine claims the store's queue lease.
    owner: String,
}

impl<S: JobStore, A: Acquirer, P: Publisher> QueueEngine<S, A, P> {
    pub fn new(store: S, acquirer: A, publisher: P, settings: EngineSettings) -> Self {
        Self {
            store,
            acquirer,
            publisher,
            settings,
            running: Mutex::new(()),
            owner: lease_owner("cycle"),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one cycle: sweep leftover artifacts, check the quota, select a job
    /// and take it through one full pipeline pass.
    ///
    /// Job-level failures are reported through [`CycleOutcome`]; only an
    /// unusable store, a reentrant call or a queue lease held by another
    /// process produce an error.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
        let Ok(_running) = self.running.try_lock() else {
            return Err(EngineError::CycleInProgress);
        };

        if let LeaseClaim::Held { owner, expires_at } =
            self.store.claim_lease(&self.owner, LEASE_TTL).await?
        {
            debug!(holder = %owner, %expires_at, "Queue lease held elsewhere");
            return Err(EngineError::QueueBusy { owner });
        }
        let result = self.renewing_lease(self.cycle()).await;
        if let Err(e) = self.store.release_lease(&self.owner).await {
            warn!(error = %e, "Could not release queue lease; it will expire");
        }
        result
    }

    /// Poll `work` to completion, renewing the queue lease meanwhile.
    async fn renewing_lease<T>(&self, work: impl Future<Output = T>) -> T {
        tokio::pin!(work);
        let mut renewal = interval_at(Instant::now() + LEASE_RENEWAL, LEASE_RENEWAL);
        loop {
            tokio::select! {
                out = &mut work => return out,
                _ = renewal.tick() => {
                    match self.store.claim_lease(&self.owner, LEASE_TTL).await {
                        Ok(LeaseClaim::Granted) => debug!("Queue lease renewed"),
                        Ok(LeaseClaim::Held { owner, .. }) => {
                            error!(holder = %owner, "Queue lease lost mid-cycle");
                        }
                        Err(e) => warn!(error = %e, "Could not renew queue lease"),
                    }
                }
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome, EngineError> {
        self.sweep_artifacts().await?;

        let quota = QuotaLedger::status(&self.store, self.settings.daily_limit).await?;
        if quota.is_exhausted() {
            info!(quota = %quota, "Daily quota exhausted");
            return Ok(CycleOutcome::QuotaExhausted {
                published_today: quota.published_today,
                daily_limit: quota.daily_limit,
            });
        }

        let Some(job) = self.store.find_eligible_for_acquired_or_pending().await? else {
            debug!("No eligible job");
            return Ok(CycleOutcome::QueueEmpty);
        };

        if !job.state.is_eligible() {
            let detail = format!("selection returned job {} in state {}", job.id, job.state);
            return Err(StoreError::Corrupt(detail).into());
        }

        info!(job = job.short_id(), state = %job.state, quota = %quota, "Selected job");
        match self.drive(job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "Job changed underneath this cycle; skipping it");
                Ok(CycleOutcome::QueueEmpty)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One pipeline pass: acquisition if the job is still `Pending`, then publication.
    async fn drive(&self, job: Job) -> Result<CycleOutcome, StoreError> {
        let job = match job.state {
            JobState::Pending => match self.acquire(job).await? {
                Ok(acquired) => acquired,
                Err(outcome) => return Ok(outcome),
            },
            _ => job,
        };
        self.publish(job).await
    }

    /// Returns the `Acquired` job, or the outcome to report if acquisition failed.
    async fn acquire(&self, job: Job) -> Result<Result<Job, CycleOutcome>, StoreError> {
        let job = self.advance(&job, Transition::BeginAcquisition).await?;
        info!(job = job.short_id(), source = %job.source_reference, "Acquiring");

        let reason = match self.acquirer.acquire(&job.id, &job.source_reference).await {
            Ok(artifact) => {
                if artifact_exists(&artifact).await {
                    return self.record_acquired(&job, artifact).await.map(Ok);
                }
                format!(
                    "acquisition reported success but produced no artifact at {}",
                    artifact.display()
                )
            }
            Err(e) => e.to_string(),
        };

        warn!(job = job.short_id(), error = %reason, "Acquisition failed");
        self.advance(&job, Transition::AcquisitionFailed { reason: reason.clone() })
            .await?;
        Ok(Err(CycleOutcome::JobFailed { id: job.id, reason }))
    }

    async fn record_acquired(&self, job: &Job, artifact: PathBuf) -> Result<Job, StoreError> {
        let transition = Transition::Acquired {
            artifact: artifact.clone(),
        };
        match self.advance(job, transition).await {
            Ok(acquired) => {
                info!(job = job.short_id(), artifact = %artifact.display(), "Acquired");
                Ok(acquired)
            }
            Err(e) => {
                // Nothing references the file once the write was refused.
                if let Err(remove_err) = tokio::fs::remove_file(&artifact).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(job = job.short_id(), path = %artifact.display(), error = %remove_err, "Could not delete unrecorded artifact");
                }
                Err(e)
            }
        }
    }

    async fn publish(&self, job: Job) -> Result<CycleOutcome, StoreError> {
        let job = self.advance(&job, Transition::BeginPublication).await?;

        let artifact = job.local_artifact.clone().unwrap_or_default();
        let result = if artifact_exists(&artifact).await {
            let metadata = self.settings.template.compose(&job);
            info!(job = job.short_id(), title = %metadata.title, privacy = %metadata.privacy, "Publishing");
            self.publisher.publish(&artifact, &metadata).await
        } else {
            Err(PublicationError::MissingArtifact(artifact))
        };

        match result {
            Ok(receipt) => {
                let published = self
                    .advance(&job, Transition::Published { at: Utc::now() })
                    .await
                    .inspect_err(|e| {
                        error!(job = job.short_id(), error = %e, "Uploaded but the record could not be marked published");
                    })?;
                info!(
                    job = published.short_id(),
                    remote_id = receipt.remote_id.as_deref().unwrap_or("-"),
                    "Published"
                );
                self.remove_artifact(&published).await;
                Ok(CycleOutcome::JobSucceeded { id: published.id })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(job = job.short_id(), error = %reason, "Publication failed; artifact kept");
                self.advance(&job, Transition::PublicationFailed { reason: reason.clone() })
                    .await?;
                Ok(CycleOutcome::JobFailed { id: job.id, reason })
            }
        }
    }

    /// Validate `transition` against `job` as read and write it with a compare-and-set.
    async fn advance(&self, job: &Job, transition: Transition) -> Result<Job, StoreError> {
        let update = StateMachine::plan(job, transition)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let next = self
            .store
            .compare_and_set_state(&job.id, job.state, update)
            .await?;
        debug!(job = job.short_id(), from = %job.state, to = %next.state, "State written");
        Ok(next)
    }

    /// Retry deletion of artifacts left behind by earlier cycles.
    async fn sweep_artifacts(&self) -> Result<(), StoreError> {
        for job in self.store.find_published_with_artifact().await? {
            debug!(job = job.short_id(), "Retrying artifact cleanup");
            self.remove_artifact(&job).await;
        }
        Ok(())
    }

    /// Delete a published job's artifact and clear the reference.
    ///
    /// Failures are logged and leave the reference set for the next sweep.
    async fn remove_artifact(&self, job: &Job) {
        let Some(path) = job.local_artifact.as_deref() else {
            return;
        };

        let policy = &self.settings.cleanup;
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match tokio::fs::remove_file(path).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) if attempt >= attempts => {
                    warn!(job = job.short_id(), path = %path.display(), error = %e, "Could not delete artifact; will retry next cycle");
                    return;
                }
                Err(e) => {
                    let delay_ms = policy.delay_for_attempt(attempt);
                    debug!(job = job.short_id(), attempt, delay_ms, error = %e, "Artifact delete failed");
                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }

        match self.advance(job, Transition::ArtifactRemoved).await {
            Ok(_) => debug!(job = job.short_id(), path = %path.display(), "Artifact removed"),
            Err(e) => warn!(job = job.short_id(), error = %e, "Artifact deleted but reference not cleared"),
        }
    }
}

async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
