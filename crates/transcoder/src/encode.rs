use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use vodpack_core::types::PackagingFormat;

use crate::TranscodeError;
use crate::plan::{AudioTier, RenditionPlan, VideoTier};

/// One packaging job handed to a [`Transcoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub format: PackagingFormat,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub video_tiers: Vec<VideoTier>,
    pub audio: AudioTier,
    pub segment_secs: u32,
    pub gop_size: u32,
    pub sc_threshold: u32,
}

impl EncodeJob {
    pub fn from_plan(input: &Path, plan: &RenditionPlan, format: PackagingFormat) -> Self {
        Self {
            format,
            input: input.to_path_buf(),
            output_dir: plan.output_dir(format).to_path_buf(),
            video_tiers: plan.video_tiers(format).to_vec(),
            audio: plan.audio,
            segment_secs: plan.segment_secs,
            gop_size: plan.gop_size,
            sc_threshold: plan.sc_threshold,
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        self.output_dir.join(self.format.entry_file())
    }
}

/// External encoding capability. Runs one job to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, job: &EncodeJob) -> Result<(), TranscodeError>;
}

#[derive(Debug, Error)]
#[error("{format} encoding failed: {cause}")]
pub struct EncodeError {
    pub format: PackagingFormat,
    pub cause: String,
}

impl EncodeError {
    fn new(format: PackagingFormat, cause: impl std::fmt::Display) -> Self {
        Self {
            format,
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub format: PackagingFormat,
    pub output_dir: PathBuf,
    pub entry_path: PathBuf,
    pub elapsed: Duration,
}

/// Drives a [`Transcoder`] for one packaging format at a time.
#[derive(Clone)]
pub struct Executor {
    transcoder: Arc<dyn Transcoder>,
}

impl Executor {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Encode `input` into the directory `plan` assigns to `format`.
    ///
    /// The output directory is created first (reusing it if present). The
    /// call blocks until the encoder exits.
    pub async fn encode(
        &self,
        input: &Path,
        plan: &RenditionPlan,
        format: PackagingFormat,
    ) -> Result<EncodeOutcome, EncodeError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(EncodeError::new(
                format,
                TranscodeError::InputMissing(input.to_path_buf()),
            ));
        }

        let job = EncodeJob::from_plan(input, plan, format);
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|e| EncodeError::new(format, e))?;

        info!(
            asset_id = %plan.asset_id,
            %format,
            tiers = job.video_tiers.len(),
            output_dir = %job.output_dir.display(),
            "starting encode"
        );
        let started = Instant::now();

        if let Err(e) = self.transcoder.run(&job).await {
            warn!(asset_id = %plan.asset_id, %format, error = %e, "encode failed");
            return Err(EncodeError::new(format, e));
        }

        let elapsed = started.elapsed();
        info!(
            asset_id = %plan.asset_id,
            %format,
            elapsed_ms = elapsed.as_millis() as u64,
            "encode finished"
        );

        Ok(EncodeOutcome {
            format,
            entry_path: job.entry_path(),
            output_dir: job.output_dir,
            elapsed,
        })
    }
}
