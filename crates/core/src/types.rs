use serde::{Deserialize, Serialize};

/// Adaptive packaging format produced for every asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingFormat {
    /// Segmented media playlist (`playlist.m3u8` + MPEG-TS segments).
    Hls,
    /// Segmented manifest (`manifest.mpd` + fMP4 init/media segments).
    Dash,
}

impl PackagingFormat {
    /// Both formats in the order they are encoded.
    pub const ALL: [PackagingFormat; 2] = [Self::Hls, Self::Dash];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::Dash => "dash",
        }
    }

    /// Name of the playlist or manifest written at the root of the rendition directory.
    pub fn entry_file(self) -> &'static str {
        match self {
            Self::Hls => "playlist.m3u8",
            Self::Dash => "manifest.mpd",
        }
    }
}

impl std::fmt::Display for PackagingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage an ingestion has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Received,
    Stored,
    Probed,
    HlsReady,
    DashReady,
    Committed,
}

impl IngestStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Stored => "stored",
            Self::Probed => "probed",
            Self::HlsReady => "hls_ready",
            Self::DashReady => "dash_ready",
            Self::Committed => "committed",
        }
    }

    /// Stage reached once the given format has been encoded.
    pub fn after_encode(format: PackagingFormat) -> Self {
        match format {
            PackagingFormat::Hls => Self::HlsReady,
            PackagingFormat::Dash => Self::DashReady,
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to on-disk artifacts of an ingestion that aborted after the
/// upload was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Leave partial output in place for inspection. The orphan sweep
    /// collects it later.
    #[default]
    Retain,
    /// Delete the raw upload, thumbnail and rendition directories immediately.
    Remove,
}

impl CleanupPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "remove" => Ok(Self::Remove),
            other => Err(format!("unknown cleanup policy '{other}'")),
        }
    }
}
