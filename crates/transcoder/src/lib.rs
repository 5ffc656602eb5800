#![allow(clippy::collapsible_if)]
pub mod encode;
pub mod ffmpeg;
pub mod ffprobe;
pub mod mime;
pub mod plan;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("ffmpeg/ffprobe not found at {0}")]
    BinaryNotFound(PathBuf),
    #[error("input file does not exist: {0}")]
    InputMissing(PathBuf),
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),
    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),
    #[error("encoder exited cleanly but {0} was not written")]
    MissingOutput(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder configuration shared by every packaging job.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// x264 preset, ignored by hardware encoders.
    pub preset: String,
    /// x264 constant rate factor, ignored by hardware encoders.
    pub crf: u8,
    pub hw_accel: Option<HwAccel>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            preset: "fast".to_string(),
            crf: 23,
            hw_accel: None,
        }
    }
}

/// Hardware H.264 encoders that accept system-memory frames, so the
/// per-representation scaling stays in software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HwAccel {
    Nvenc,
    Qsv,
    VideoToolbox,
}

impl HwAccel {
    pub fn video_codec(self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::VideoToolbox => "h264_videotoolbox",
        }
    }
}

impl std::str::FromStr for HwAccel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvenc" | "cuda" => Ok(Self::Nvenc),
            "qsv" => Ok(Self::Qsv),
            "videotoolbox" => Ok(Self::VideoToolbox),
            other => Err(format!("unsupported hardware encoder '{other}'")),
        }
    }
}
