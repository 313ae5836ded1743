//! Scripted acquisition and publication adapters shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::acquisition::{Acquirer, artifact_stem};
use crate::error::{AcquisitionError, PublicationError};
use crate::publication::{PublishReceipt, Publisher, VideoMetadata};

/// What a [`MockAcquirer`] does on every call.
#[derive(Debug, Clone)]
pub enum AcquireBehavior {
    /// Write a small `video_<id>.mp4` into the media directory.
    WriteFile,
    /// Report success without producing anything on disk.
    ClaimWithoutFile,
    Fail(String),
}

pub struct MockAcquirer {
    media_dir: PathBuf,
    behavior: AcquireBehavior,
    calls: Mutex<Vec<String>>,
}

impl MockAcquirer {
    pub fn new(media_dir: &Path, behavior: AcquireBehavior) -> Self {
        Self {
            media_dir: media_dir.to_path_buf(),
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Source references seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Acquirer for MockAcquirer {
    async fn acquire(&self, job_id: &str, source_reference: &str) -> Result<PathBuf, AcquisitionError> {
        self.calls.lock().unwrap().push(source_reference.to_string());
        let path = self.media_dir.join(format!("{}.mp4", artifact_stem(job_id)));
        match &self.behavior {
            AcquireBehavior::WriteFile => {
                tokio::fs::write(&path, b"fake video").await?;
                Ok(path)
            }
            AcquireBehavior::ClaimWithoutFile => Ok(path),
            AcquireBehavior::Fail(message) => Err(AcquisitionError::ToolFailed {
                status: "exit status: 1".into(),
                message: message.clone(),
            }),
        }
    }
}

/// Publisher that succeeds, or fails with a rejection, and records every upload.
pub struct MockPublisher {
    fail_with: Option<String>,
    uploads: Mutex<Vec<(PathBuf, VideoMetadata)>>,
}

impl MockPublisher {
    pub fn succeeding() -> Self {
        Self {
            fail_with: None,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<(PathBuf, VideoMetadata)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Publisher for MockPublisher {
    async fn publish(
        &self,
        artifact: &Path,
        metadata: &VideoMetadata,
    ) -> Result<PublishReceipt, PublicationError> {
        assert!(artifact.exists(), "publisher called without an artifact on disk");
        self.uploads
            .lock()
            .unwrap()
            .push((artifact.to_path_buf(), metadata.clone()));
        match &self.fail_with {
            Some(message) => Err(PublicationError::Rejected {
                status: 400,
                message: message.clone(),
            }),
            None => Ok(PublishReceipt {
                remote_id: Some("remote-1".into()),
            }),
        }
    }
}
