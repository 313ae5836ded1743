use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response, StatusCode};
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::error::YouTubeError;
use super::types::{ApiErrorBody, TokenResponse, VideoInsertRequest, VideoResource};
use crate::error::PublicationError;
use crate::publication::{PublishReceipt, Publisher, VideoMetadata};

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth2 installed-app credentials with a long-lived refresh token.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

pub struct YouTubeClient {
    client: Client,
    credentials: OAuthCredentials,
    token_url: String,
    upload_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl YouTubeClient {
    pub fn new(credentials: OAuthCredentials, upload_timeout: Duration) -> Result<Self, YouTubeError> {
        Self::with_endpoints(
            credentials,
            TOKEN_URL.to_string(),
            UPLOAD_URL.to_string(),
            upload_timeout,
        )
    }

    /// Create a client pointing at custom endpoints (useful for testing).
    pub fn with_endpoints(
        credentials: OAuthCredentials,
        token_url: String,
        upload_url: String,
        upload_timeout: Duration,
    ) -> Result<Self, YouTubeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(upload_timeout)
            .build()?;
        Ok(Self {
            client,
            credentials,
            token_url,
            upload_url,
            token: RwLock::new(None),
        })
    }

    /// A valid access token, refreshed through the token endpoint when needed.
    async fn access_token(&self) -> Result<String, YouTubeError> {
        {
            let cache = self.token.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.is_fresh()
            {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref()
            && cached.is_fresh()
        {
            return Ok(cached.access_token.clone());
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YouTubeError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token = response.json::<TokenResponse>().await?;
        let ttl = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(TOKEN_DEFAULT_TTL);
        debug!(ttl_secs = ttl.as_secs(), "Refreshed YouTube access token");

        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token.access_token)
    }

    pub async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Upload a local file with the resumable protocol: open a session, then
    /// stream the bytes to the returned session URI.
    pub async fn upload_video(
        &self,
        path: &Path,
        request: &VideoInsertRequest,
    ) -> Result<VideoResource, YouTubeError> {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(YouTubeError::MissingFile(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let token = self.access_token().await?;
        let session_uri = self.start_session(&token, request, size).await?;
        debug!(%session_uri, size, "Opened resumable upload session");

        let file = tokio::fs::File::open(path).await?;
        let response = self
            .client
            .put(&session_uri)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "video/*")
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let response = self.check(response).await?;
        let video = response.json::<VideoResource>().await?;
        info!(video_id = %video.id, bytes = size, "Upload complete");
        Ok(video)
    }

    async fn start_session(
        &self,
        token: &str,
        request: &VideoInsertRequest,
        size: u64,
    ) -> Result<String, YouTubeError> {
        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", size)
            .json(request)
            .send()
            .await?;

        let response = self.check(response).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(YouTubeError::MissingSessionUri)
    }

    /// Map non-success responses onto the error taxonomy.
    async fn check(&self, response: Response) -> Result<Response, YouTubeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ApiErrorBody>(&text).ok();
        let message = body
            .as_ref()
            .map(|b| b.error.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or(text);

        if status == StatusCode::UNAUTHORIZED {
            warn!("YouTube rejected the access token; it will be refreshed next time");
            self.invalidate_token().await;
            return Err(YouTubeError::Auth(message));
        }

        let quota = body
            .as_ref()
            .is_some_and(|b| b.has_reason("quotaExceeded") || b.has_reason("uploadLimitExceeded"));
        if quota {
            return Err(YouTubeError::QuotaExceeded(message));
        }

        Err(YouTubeError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

impl Publisher for YouTubeClient {
    async fn publish(
        &self,
        artifact: &Path,
        metadata: &VideoMetadata,
    ) -> Result<PublishReceipt, PublicationError> {
        let request = VideoInsertRequest::from(metadata);
        let video = self.upload_video(artifact, &request).await?;
        Ok(PublishReceipt {
            remote_id: Some(video.id),
        })
    }
}
