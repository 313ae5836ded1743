//! Acquisition adapters: turn a source reference into a local media file.
//!
//! The engine sees only [`Acquirer`]. Which strategy is active is decided once,
//! from configuration, by [`AcquisitionStrategy::from_config`].

mod http;
mod ytdlp;

pub use http::HttpAcquirer;
pub use ytdlp::YtDlpAcquirer;

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{AcquisitionConfig, StrategyKind};
use crate::error::AcquisitionError;

pub trait Acquirer {
    /// Fetch `source_reference` and return the path of the local artifact.
    ///
    /// `job_id` only names the output file; implementations must not assume
    /// anything else about it.
    async fn acquire(&self, job_id: &str, source_reference: &str) -> Result<PathBuf, AcquisitionError>;
}

/// The configured acquisition strategy.
pub enum AcquisitionStrategy {
    YtDlp(YtDlpAcquirer),
    Http(HttpAcquirer),
}

impl AcquisitionStrategy {
    pub fn from_config(config: &AcquisitionConfig, media_dir: PathBuf) -> Result<Self, AcquisitionError> {
        Ok(match config.strategy {
            StrategyKind::YtDlp => Self::YtDlp(YtDlpAcquirer::new(config, media_dir)),
            StrategyKind::Http => Self::Http(HttpAcquirer::new(media_dir, config.timeout_secs)?),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::YtDlp(_) => "yt-dlp",
            Self::Http(_) => "http",
        }
    }
}

impl Acquirer for AcquisitionStrategy {
    async fn acquire(&self, job_id: &str, source_reference: &str) -> Result<PathBuf, AcquisitionError> {
        match self {
            Self::YtDlp(inner) => inner.acquire(job_id, source_reference).await,
            Self::Http(inner) => inner.acquire(job_id, source_reference).await,
        }
    }
}

/// File stem shared by all strategies: `video_<job id>`.
pub(crate) fn artifact_stem(job_id: &str) -> String {
    format!("video_{job_id}")
}

/// Delete every `video_<job id>.*` file in `media_dir`, partial downloads
/// included. Returns how many files were removed.
pub async fn remove_job_files(media_dir: &Path, job_id: &str) -> io::Result<usize> {
    let prefix = format!("{}.", artifact_stem(job_id));
    let mut entries = match tokio::fs::read_dir(media_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(path = %entry.path().display(), "Removed leftover job file");
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}
