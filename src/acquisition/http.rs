//! Acquisition by fetching a direct media URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{Acquirer, artifact_stem};
use crate::error::AcquisitionError;

pub struct HttpAcquirer {
    client: Client,
    media_dir: PathBuf,
}

impl HttpAcquirer {
    pub fn new(media_dir: PathBuf, timeout_secs: u64) -> Result<Self, AcquisitionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, media_dir })
    }

    async fn download_to(&self, source_reference: &str, path: &Path) -> Result<u64, AcquisitionError> {
        let mut response = self.client.get(source_reference).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Http {
                status: status.as_u16(),
                url: source_reference.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

impl Acquirer for HttpAcquirer {
    async fn acquire(&self, job_id: &str, source_reference: &str) -> Result<PathBuf, AcquisitionError> {
        tokio::fs::create_dir_all(&self.media_dir).await?;
        let path = self.media_dir.join(format!("{}.mp4", artifact_stem(job_id)));

        info!(job_id, source = source_reference, "Fetching source media");
        match self.download_to(source_reference, &path).await {
            Ok(0) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(job_id, "Failed to remove empty download: {remove_err}");
                }
                Err(AcquisitionError::MissingArtifact(path))
            }
            Ok(bytes) => {
                info!(job_id, path = %path.display(), bytes, "Fetched source media");
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(job_id, "Failed to remove partial download: {remove_err}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn downloads_body_to_media_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let acquirer = HttpAcquirer::new(tmp.path().join("media"), 30).unwrap();
        let artifact = acquirer
            .acquire("job1", &format!("{}/clip.mp4", server.uri()))
            .await
            .unwrap();

        assert_eq!(artifact, tmp.path().join("media").join("video_job1.mp4"));
        assert_eq!(std::fs::metadata(&artifact).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn http_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let acquirer = HttpAcquirer::new(tmp.path().to_path_buf(), 30).unwrap();
        let err = acquirer
            .acquire("job2", &format!("{}/gone.mp4", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::Http { status: 404, .. }));
        assert!(!tmp.path().join("video_job2.mp4").exists());
    }

    #[tokio::test]
    async fn empty_body_is_missing_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let acquirer = HttpAcquirer::new(tmp.path().to_path_buf(), 30).unwrap();
        let err = acquirer
            .acquire("job3", &format!("{}/empty.mp4", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::MissingArtifact(_)));
        assert!(!tmp.path().join("video_job3.mp4").exists());
    }
}
