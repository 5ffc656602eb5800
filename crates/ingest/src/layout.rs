use std::path::{Path, PathBuf};

use vodpack_core::types::PackagingFormat;
use vodpack_transcoder::plan::{self, RenditionPlan};

const THUMBNAILS_DIR: &str = "thumbnails";
const DEFAULT_THUMBNAIL_EXT: &str = "jpg";

/// On-disk locations of raw uploads, thumbnails and renditions.
///
/// ```text
/// <uploads>/<id>.mp4
/// <static>/thumbnails/<id>.<ext>
/// <static>/<id>_hls/playlist.m3u8
/// <static>/<id>_dash/manifest.mpd
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    uploads_dir: PathBuf,
    static_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(uploads_dir: impl Into<PathBuf>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            static_dir: static_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.static_dir.join(THUMBNAILS_DIR)
    }

    pub fn upload_path(&self, asset_id: &str) -> PathBuf {
        self.uploads_dir.join(format!("{asset_id}.mp4"))
    }

    /// `ext` is without the leading dot.
    pub fn thumbnail_path(&self, asset_id: &str, ext: &str) -> PathBuf {
        self.thumbnails_dir().join(format!("{asset_id}.{ext}"))
    }

    pub fn plan(&self, asset_id: &str) -> RenditionPlan {
        plan::plan(asset_id, &self.static_dir)
    }

    /// Create the uploads, static and thumbnails directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(self.thumbnails_dir()).await
    }
}

/// Public URL of the rendition entry file for `format`.
pub fn rendition_url(asset_id: &str, format: PackagingFormat) -> String {
    format!(
        "/static/{}/{}",
        plan::rendition_dir_name(asset_id, format),
        format.entry_file()
    )
}

/// Public URL that serves an asset's thumbnail.
pub fn thumbnail_url(asset_id: &str) -> String {
    format!("/thumbnail/{asset_id}")
}

/// Extension for a stored thumbnail, taken from the uploaded file name.
/// Falls back to `jpg` when the name has no usable extension.
pub fn thumbnail_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_THUMBNAIL_EXT.to_string())
}
