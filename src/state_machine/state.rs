use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{FieldUpdate, Job, JobUpdate};

/// The six states of a queued video job.
///
/// Each job flows through: PENDING → ACQUIRING → ACQUIRED → PUBLISHING → PUBLISHED,
/// dropping to FAILED from either in-flight stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Acquiring,
    Acquired,
    Publishing,
    Published,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Acquiring,
        JobState::Acquired,
        JobState::Publishing,
        JobState::Published,
        JobState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Acquiring => "acquiring",
            JobState::Acquired => "acquired",
            JobState::Publishing => "publishing",
            JobState::Published => "published",
            JobState::Failed => "failed",
        }
    }

    /// Terminal for automatic processing. `Failed` only leaves through an explicit requeue.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Published | JobState::Failed)
    }

    /// In-flight markers written while an adapter call is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobState::Acquiring | JobState::Publishing)
    }

    /// States the selection query may pick up.
    pub fn is_eligible(self) -> bool {
        matches!(self, JobState::Pending | JobState::Acquired)
    }

    /// The engine transition table. Anything not listed here is rejected.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Acquiring)
                | (JobState::Acquiring, JobState::Acquired)
                | (JobState::Acquiring, JobState::Failed)
                | (JobState::Acquired, JobState::Publishing)
                | (JobState::Publishing, JobState::Published)
                | (JobState::Publishing, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// An event applied to a job.
///
/// The first six are engine events and follow the transition table. The last
/// three are bookkeeping or operator actions with their own preconditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    BeginAcquisition,
    Acquired { artifact: PathBuf },
    AcquisitionFailed { reason: String },
    BeginPublication,
    Published { at: DateTime<Utc> },
    PublicationFailed { reason: String },
    /// The local artifact of a published job was deleted.
    ArtifactRemoved,
    /// Explicit re-enqueue of a failed job.
    Requeue,
    /// Reset of a job left in flight by an interrupted process.
    Recover,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::BeginAcquisition => "begin_acquisition",
            Transition::Acquired { .. } => "acquired",
            Transition::AcquisitionFailed { .. } => "acquisition_failed",
            Transition::BeginPublication => "begin_publication",
            Transition::Published { .. } => "published",
            Transition::PublicationFailed { .. } => "publication_failed",
            Transition::ArtifactRemoved => "artifact_removed",
            Transition::Requeue => "requeue",
            Transition::Recover => "recover",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {transition} to job {job_id} in state {from}")]
pub struct InvalidTransition {
    pub job_id: String,
    pub from: JobState,
    pub transition: &'static str,
}

/// Validates events against a job and turns them into store updates.
pub struct StateMachine;

impl StateMachine {
    /// Compute the field set to write for `transition`, given the job as it was read.
    ///
    /// The returned update is meant to be written with a compare-and-set on
    /// `job.state`; planning never mutates the job itself.
    pub fn plan(job: &Job, transition: Transition) -> Result<JobUpdate, InvalidTransition> {
        let invalid = |t: &Transition| InvalidTransition {
            job_id: job.id.clone(),
            from: job.state,
            transition: t.name(),
        };

        let update = match &transition {
            Transition::BeginAcquisition => Self::edge(job, JobState::Acquiring)
                .map(JobUpdate::to),
            Transition::Acquired { artifact } => {
                Self::edge(job, JobState::Acquired).map(|state| JobUpdate {
                    local_artifact: FieldUpdate::Set(artifact.clone()),
                    ..JobUpdate::to(state)
                })
            }
            Transition::AcquisitionFailed { reason } => {
                if job.state == JobState::Acquiring {
                    Some(JobUpdate::failed(reason))
                } else {
                    None
                }
            }
            Transition::BeginPublication => Self::edge(job, JobState::Publishing)
                .map(JobUpdate::to),
            Transition::Published { at } => {
                if job.published_at.is_some() {
                    None
                } else {
                    Self::edge(job, JobState::Published).map(|state| JobUpdate {
                        published_at: Some(*at),
                        ..JobUpdate::to(state)
                    })
                }
            }
            Transition::PublicationFailed { reason } => {
                if job.state == JobState::Publishing {
                    Some(JobUpdate::failed(reason))
                } else {
                    None
                }
            }
            Transition::ArtifactRemoved => {
                if job.state == JobState::Published {
                    Some(JobUpdate {
                        local_artifact: FieldUpdate::Clear,
                        ..JobUpdate::to(JobState::Published)
                    })
                } else {
                    None
                }
            }
            Transition::Requeue => {
                if job.state == JobState::Failed {
                    Some(JobUpdate {
                        local_artifact: FieldUpdate::Clear,
                        last_error: FieldUpdate::Clear,
                        ..JobUpdate::to(JobState::Pending)
                    })
                } else {
                    None
                }
            }
            Transition::Recover => match job.state {
                JobState::Acquiring => Some(JobUpdate {
                    local_artifact: FieldUpdate::Clear,
                    ..JobUpdate::to(JobState::Pending)
                }),
                // An upload may have been cut off mid-stream; the artifact is
                // still on disk, so publication is simply attempted again.
                JobState::Publishing if job.local_artifact.is_some() => {
                    Some(JobUpdate::to(JobState::Acquired))
                }
                JobState::Publishing => Some(JobUpdate::to(JobState::Pending)),
                _ => None,
            },
        };

        update.ok_or_else(|| invalid(&transition))
    }

    fn edge(job: &Job, next: JobState) -> Option<JobState> {
        job.state.can_transition_to(next).then_some(next)
    }
}
