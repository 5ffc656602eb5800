use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::TranscodeError;

/// Extracts the container duration of a media file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Duration in seconds as printed by the probe, e.g. `"5.000000"`.
    async fn probe_duration(&self, file: &Path) -> Result<String, TranscodeError>;
}

/// [`MediaProber`] backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    ffprobe_path: PathBuf,
}

impl Ffprobe {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl MediaProber for Ffprobe {
    async fn probe_duration(&self, file: &Path) -> Result<String, TranscodeError> {
        probe_duration(&self.ffprobe_path, file).await
    }
}

/// Run ffprobe configured to print only `format=duration` as plain text.
pub async fn probe_duration(ffprobe_path: &Path, file: &Path) -> Result<String, TranscodeError> {
    if !tokio::fs::try_exists(file).await.unwrap_or(false) {
        return Err(TranscodeError::InputMissing(file.to_path_buf()));
    }

    let output = tokio::process::Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                TranscodeError::BinaryNotFound(ffprobe_path.to_path_buf())
            }
            _ => TranscodeError::ProbeFailed(format!("spawn failed: {e}")),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscodeError::ProbeFailed(stderr.trim().to_string()));
    }

    let duration = parse_duration_output(&String::from_utf8_lossy(&output.stdout))?;
    debug!(file = %file.display(), %duration, "probed duration");
    Ok(duration)
}

/// Validate ffprobe's plain-text duration and return it trimmed.
fn parse_duration_output(stdout: &str) -> Result<String, TranscodeError> {
    let text = stdout.trim();
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(text.to_string()),
        _ if text.is_empty() => Err(TranscodeError::ProbeFailed(
            "no duration reported".into(),
        )),
        _ => Err(TranscodeError::ProbeFailed(format!(
            "unrecognised duration '{text}'"
        ))),
    }
}
