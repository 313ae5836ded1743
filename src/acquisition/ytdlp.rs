//! Acquisition through the `yt-dlp` command line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Acquirer, artifact_stem, remove_job_files};
use crate::config::AcquisitionConfig;
use crate::error::AcquisitionError;

pub struct YtDlpAcquirer {
    binary: String,
    format: String,
    proxy: Option<String>,
    cookies: Option<PathBuf>,
    timeout: Duration,
    media_dir: PathBuf,
}

impl YtDlpAcquirer {
    pub fn new(config: &AcquisitionConfig, media_dir: PathBuf) -> Self {
        Self {
            binary: config.binary.clone(),
            format: config.format.clone(),
            proxy: config.proxy.clone(),
            cookies: config.cookies.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            media_dir,
        }
    }

    /// Arguments for one download, source reference last.
    fn build_args(&self, output_template: &str, source_reference: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-playlist",
            "--no-progress",
            "--format",
            self.format.as_str(),
            "--merge-output-format",
            "mp4",
            "--output",
            output_template,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".into());
            args.push(proxy.clone());
        }
        if let Some(cookies) = &self.cookies {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }
        args.push(source_reference.to_string());
        args
    }
}

impl Acquirer for YtDlpAcquirer {
    async fn acquire(&self, job_id: &str, source_reference: &str) -> Result<PathBuf, AcquisitionError> {
        let binary = which::which(&self.binary)
            .map_err(|_| AcquisitionError::ToolNotFound(self.binary.clone()))?;

        tokio::fs::create_dir_all(&self.media_dir).await?;
        // Leftovers of an interrupted attempt would be mistaken for the output.
        let stale = remove_job_files(&self.media_dir, job_id).await?;
        if stale > 0 {
            debug!(job_id, stale, "Removed files from an earlier attempt");
        }
        let stem = artifact_stem(job_id);
        let template = self.media_dir.join(format!("{stem}.%(ext)s"));
        let args = self.build_args(&template.to_string_lossy(), source_reference);

        info!(job_id, source = source_reference, "Downloading with yt-dlp");
        debug!(?args, "yt-dlp arguments");

        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| AcquisitionError::TimedOut(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(job_id, "yt-dlp stderr: {}", stderr.trim());
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("unknown error")
                .to_string();
            return Err(AcquisitionError::ToolFailed {
                status: output.status.to_string(),
                message,
            });
        }

        let path = locate_artifact(&self.media_dir, &stem).await?;
        info!(job_id, path = %path.display(), "Downloaded source media");
        Ok(path)
    }
}

/// Find the file yt-dlp produced for `stem`, preferring `<stem>.mp4`.
async fn locate_artifact(dir: &Path, stem: &str) -> Result<PathBuf, AcquisitionError> {
    let expected = dir.join(format!("{stem}.mp4"));
    if tokio::fs::try_exists(&expected).await? {
        return Ok(expected);
    }

    let prefix = format!("{stem}.");
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            return Ok(entry.path());
        }
    }

    Err(AcquisitionError::MissingArtifact(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use tempfile::TempDir;

    fn config(binary: &str) -> AcquisitionConfig {
        AcquisitionConfig {
            strategy: StrategyKind::YtDlp,
            binary: binary.to_string(),
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn args_end_with_source_and_include_options() {
        let mut cfg = config("yt-dlp");
        cfg.proxy = Some("socks5://127.0.0.1:9050".into());
        cfg.cookies = Some(PathBuf::from("/tmp/cookies.txt"));
        let acquirer = YtDlpAcquirer::new(&cfg, PathBuf::from("media"));

        let args = acquirer.build_args("media/video_1.%(ext)s", "https://youtu.be/abc");
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
        assert!(args.contains(&"--no-playlist".to_string()));
        let proxy_at = args.iter().position(|a| a == "--proxy").unwrap();
        assert_eq!(args[proxy_at + 1], "socks5://127.0.0.1:9050");
        let out_at = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[out_at + 1], "media/video_1.%(ext)s");
        assert!(args.contains(&"--cookies".to_string()));
    }

    #[tokio::test]
    async fn missing_binary_is_tool_not_found() {
        let tmp = TempDir::new().unwrap();
        let acquirer = YtDlpAcquirer::new(
            &config("definitely-not-a-real-downloader-xyz"),
            tmp.path().to_path_buf(),
        );
        let err = acquirer.acquire("job", "https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, AcquisitionError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn locate_prefers_mp4_and_skips_partials() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("video_a.mp4.part"), b"x").unwrap();
        std::fs::write(tmp.path().join("video_a.webm"), b"x").unwrap();
        let found = locate_artifact(tmp.path(), "video_a").await.unwrap();
        assert_eq!(found, tmp.path().join("video_a.webm"));

        std::fs::write(tmp.path().join("video_a.mp4"), b"x").unwrap();
        let found = locate_artifact(tmp.path(), "video_a").await.unwrap();
        assert_eq!(found, tmp.path().join("video_a.mp4"));
    }

    #[tokio::test]
    async fn locate_reports_missing_artifact() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("video_b.mp4.part"), b"x").unwrap();
        let err = locate_artifact(tmp.path(), "video_b").await.unwrap_err();
        assert!(matches!(err, AcquisitionError::MissingArtifact(_)));
    }
}
