//! Encoding ladder and output layout for an asset.
//!
//! Everything here is pure: the same asset id and storage root always yield
//! the same plan.

use std::path::{Path, PathBuf};

use vodpack_core::types::PackagingFormat;

/// One video rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTier {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl VideoTier {
    /// `WxH` as ffmpeg's `-s` expects it.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTier {
    pub codec: &'static str,
    pub sample_rate_hz: u32,
    pub bitrate_kbps: u32,
}

pub const VIDEO_LADDER: [VideoTier; 3] = [
    VideoTier {
        name: "360p",
        width: 640,
        height: 360,
        bitrate_kbps: 800,
    },
    VideoTier {
        name: "720p",
        width: 1280,
        height: 720,
        bitrate_kbps: 1400,
    },
    VideoTier {
        name: "1080p",
        width: 1920,
        height: 1080,
        bitrate_kbps: 2800,
    },
];

pub const AUDIO_TIER: AudioTier = AudioTier {
    codec: "aac",
    sample_rate_hz: 48_000,
    bitrate_kbps: 128,
};

pub const SEGMENT_SECS: u32 = 10;
pub const GOP_SIZE: u32 = 48;
/// Zero disables scene-cut keyframes so segment boundaries depend only on the GOP.
pub const SCENE_CHANGE_THRESHOLD: u32 = 0;
/// Constant output frame rate of the DASH representations.
pub const DASH_FRAME_RATE: u32 = 30;

/// Directories, entry files and ladder for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionPlan {
    pub asset_id: String,
    pub hls_dir: PathBuf,
    pub dash_dir: PathBuf,
    pub video_ladder: Vec<VideoTier>,
    pub audio: AudioTier,
    pub segment_secs: u32,
    pub gop_size: u32,
    pub sc_threshold: u32,
}

impl RenditionPlan {
    pub fn output_dir(&self, format: PackagingFormat) -> &Path {
        match format {
            PackagingFormat::Hls => &self.hls_dir,
            PackagingFormat::Dash => &self.dash_dir,
        }
    }

    /// Path of `playlist.m3u8` or `manifest.mpd`.
    pub fn entry_path(&self, format: PackagingFormat) -> PathBuf {
        self.output_dir(format).join(format.entry_file())
    }

    /// Video tiers encoded for `format`.
    ///
    /// HLS carries only the lowest rung while DASH carries the full ladder.
    /// Players that want adaptive switching must use the DASH manifest.
    pub fn video_tiers(&self, format: PackagingFormat) -> &[VideoTier] {
        match format {
            PackagingFormat::Hls => &self.video_ladder[..1],
            PackagingFormat::Dash => &self.video_ladder,
        }
    }
}

/// Directory name for one format's output, e.g. `<id>_hls`.
pub fn rendition_dir_name(asset_id: &str, format: PackagingFormat) -> String {
    format!("{asset_id}_{}", format.as_str())
}

/// Inverse of [`rendition_dir_name`].
pub fn parse_rendition_dir_name(name: &str) -> Option<(&str, PackagingFormat)> {
    let (id, suffix) = name.rsplit_once('_')?;
    if id.is_empty() {
        return None;
    }
    PackagingFormat::ALL
        .into_iter()
        .find(|f| f.as_str() == suffix)
        .map(|f| (id, f))
}

pub fn plan(asset_id: &str, base_root: &Path) -> RenditionPlan {
    RenditionPlan {
        asset_id: asset_id.to_string(),
        hls_dir: base_root.join(rendition_dir_name(asset_id, PackagingFormat::Hls)),
        dash_dir: base_root.join(rendition_dir_name(asset_id, PackagingFormat::Dash)),
        video_ladder: VIDEO_LADDER.to_vec(),
        audio: AUDIO_TIER,
        segment_secs: SEGMENT_SECS,
        gop_size: GOP_SIZE,
        sc_threshold: SCENE_CHANGE_THRESHOLD,
    }
}
