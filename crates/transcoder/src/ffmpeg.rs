use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info};
use vodpack_core::types::PackagingFormat;

use crate::encode::{EncodeJob, Transcoder};
use crate::{TranscodeError, TranscoderConfig};

pub const HLS_SEGMENT_PATTERN: &str = "segment_%03d.ts";
pub const DASH_INIT_SEGMENT_NAME: &str = "init-stream$RepresentationID$.m4s";
pub const DASH_MEDIA_SEGMENT_NAME: &str = "chunk-stream$RepresentationID$-$Number$.m4s";

const LOG_FILE: &str = "ffmpeg.log";
const LOG_TAIL_LINES: usize = 8;

/// [`Transcoder`] that runs ffmpeg as a subprocess.
///
/// The child is killed if the returned future is dropped, so abandoning an
/// ingestion also stops its encoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, job: &EncodeJob) -> Result<(), TranscodeError> {
        let args = build_args(job, &self.config);
        let log_path = job.output_dir.join(LOG_FILE);
        let log_file = tokio::fs::File::create(&log_path)
            .await
            .map_err(|e| TranscodeError::FfmpegFailed(format!("create log: {e}")))?
            .into_std()
            .await;

        info!(format = %job.format, ffmpeg = ?self.config.ffmpeg_path, "spawning ffmpeg");
        debug!(?args, "ffmpeg arguments");

        let status = tokio::process::Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log_file))
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    TranscodeError::BinaryNotFound(self.config.ffmpeg_path.clone())
                }
                _ => TranscodeError::FfmpegFailed(format!("spawn: {e}")),
            })?;

        if !status.success() {
            let tail = log_tail(&log_path).await;
            return Err(TranscodeError::FfmpegFailed(format!("{status}: {tail}")));
        }

        let entry = job.entry_path();
        if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput(entry));
        }
        Ok(())
    }
}

/// Full ffmpeg argument list for a job.
pub fn build_args(job: &EncodeJob, config: &TranscoderConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
    args.extend(["-i".into(), path_arg(&job.input)]);

    // Keyframe cadence shared by both packagers
    args.extend([
        "-g".into(),
        job.gop_size.to_string(),
        "-sc_threshold".into(),
        job.sc_threshold.to_string(),
    ]);

    if job.format == PackagingFormat::Dash {
        args.extend([
            "-r".into(),
            crate::plan::DASH_FRAME_RATE.to_string(),
            "-fps_mode".into(),
            "cfr".into(),
        ]);
    }

    for _ in &job.video_tiers {
        args.extend(["-map".into(), "0:v:0".into()]);
    }
    args.extend(["-map".into(), "0:a:0".into()]);

    push_codec_args(&mut args, job, config);

    for (i, tier) in job.video_tiers.iter().enumerate() {
        args.extend([
            format!("-b:v:{i}"),
            format!("{}k", tier.bitrate_kbps),
            format!("-s:v:{i}"),
            tier.size(),
        ]);
    }

    match job.format {
        PackagingFormat::Hls => push_hls_output(&mut args, job),
        PackagingFormat::Dash => push_dash_output(&mut args, job),
    }
    args
}

fn push_codec_args(args: &mut Vec<String>, job: &EncodeJob, config: &TranscoderConfig) {
    match config.hw_accel {
        Some(hw) => args.extend(["-c:v".into(), hw.video_codec().into()]),
        None => args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            config.preset.clone(),
            "-crf".into(),
            config.crf.to_string(),
        ]),
    }
    args.extend([
        "-profile:v".into(),
        "main".into(),
        "-c:a".into(),
        job.audio.codec.into(),
        "-ar".into(),
        job.audio.sample_rate_hz.to_string(),
        "-b:a".into(),
        format!("{}k", job.audio.bitrate_kbps),
    ]);
}

fn push_hls_output(args: &mut Vec<String>, job: &EncodeJob) {
    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        job.segment_secs.to_string(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_flags".into(),
        "independent_segments".into(),
        "-hls_segment_filename".into(),
        path_arg(&job.output_dir.join(HLS_SEGMENT_PATTERN)),
        path_arg(&job.entry_path()),
    ]);
}

fn push_dash_output(args: &mut Vec<String>, job: &EncodeJob) {
    args.extend([
        "-f".into(),
        "dash".into(),
        "-adaptation_sets".into(),
        "id=0,streams=v id=1,streams=a".into(),
        "-seg_duration".into(),
        job.segment_secs.to_string(),
        "-use_timeline".into(),
        "1".into(),
        "-use_template".into(),
        "1".into(),
        "-init_seg_name".into(),
        DASH_INIT_SEGMENT_NAME.into(),
        "-media_seg_name".into(),
        DASH_MEDIA_SEGMENT_NAME.into(),
        path_arg(&job.entry_path()),
    ]);
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Last few lines of the encoder log, joined for an error message.
async fn log_tail(log_path: &Path) -> String {
    match tokio::fs::read_to_string(log_path).await {
        Ok(log) => {
            let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
            let start = lines.len().saturating_sub(LOG_TAIL_LINES);
            lines[start..].join(" | ")
        }
        Err(_) => format!("see {}", log_path.display()),
    }
}
