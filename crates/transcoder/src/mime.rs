//! Content types for rendition output.

/// Content-Type for HLS media playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content-Type for DASH manifests.
pub const MANIFEST_CONTENT_TYPE: &str = "application/dash+xml";

/// Content-Type for MPEG-TS segments.
pub const SEGMENT_CONTENT_TYPE_TS: &str = "video/MP2T";

/// Content-Type for fMP4 init and media segments.
pub const SEGMENT_CONTENT_TYPE_MP4: &str = "video/mp4";

/// Content type of a file written by an HLS or DASH job, or `None` if the
/// name is not one the packagers produce.
pub fn rendition_content_type(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "m3u8" => Some(PLAYLIST_CONTENT_TYPE),
        "mpd" => Some(MANIFEST_CONTENT_TYPE),
        "ts" => Some(SEGMENT_CONTENT_TYPE_TS),
        "m4s" | "mp4" => Some(SEGMENT_CONTENT_TYPE_MP4),
        _ => None,
    }
}
