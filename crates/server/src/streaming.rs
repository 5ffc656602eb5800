use std::path::{Component, Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use vodpack_core::error::ApiError;
use vodpack_transcoder::mime::rendition_content_type;
use vodpack_transcoder::plan::parse_rendition_dir_name;

use crate::error::AppError;
use crate::state::AppState;

/// A single byte range resolved against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end_inclusive: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end_inclusive - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Not a single `bytes=` range we understand. The header is ignored.
    Malformed,
    /// Well formed but outside the file. Answered with 416.
    Unsatisfiable,
}

/// Parse an HTTP Range header per RFC 7233.
/// Only supports single byte ranges: `bytes=start-end`, `bytes=start-` or `bytes=-suffix`.
pub fn parse_range_header(range_str: &str, file_size: u64) -> Result<ByteRange, RangeError> {
    let spec = range_str
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    if spec.contains(',') {
        return Err(RangeError::Malformed);
    }
    let (start_s, end_s) = spec.split_once('-').ok_or(RangeError::Malformed)?;

    if start_s.is_empty() {
        // bytes=-500 means the last 500 bytes
        let suffix: u64 = end_s.parse().map_err(|_| RangeError::Malformed)?;
        if suffix == 0 || file_size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: file_size.saturating_sub(suffix),
            end_inclusive: file_size - 1,
        });
    }

    let start: u64 = start_s.parse().map_err(|_| RangeError::Malformed)?;
    let end: Option<u64> = if end_s.is_empty() {
        None
    } else {
        Some(end_s.parse().map_err(|_| RangeError::Malformed)?)
    };
    if end.is_some_and(|end| start > end) {
        return Err(RangeError::Malformed);
    }
    if start >= file_size {
        return Err(RangeError::Unsatisfiable);
    }

    let last = file_size - 1;
    Ok(ByteRange {
        start,
        end_inclusive: end.map_or(last, |end| end.min(last)),
    })
}

/// Content-type guess from file extension.
pub fn content_type_for_path(path: &FsPath) -> &'static str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if let Some(ct) = rendition_content_type(name) {
        return ct;
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Resolve a request path against `root`, refusing anything that could
/// escape it (`..`, absolute paths, drive prefixes).
pub fn resolve_under(root: &FsPath, requested: &str) -> Result<PathBuf, ApiError> {
    let relative = FsPath::new(requested.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ApiError::BadRequest("invalid path".into()));
            }
        }
    }
    if depth == 0 {
        return Err(ApiError::NotFound("file not found".into()));
    }
    Ok(resolved)
}

/// Whether a path under the static root is public: packaged rendition files
/// inside `<id>_hls` / `<id>_dash`, and images under `thumbnails/`. Encoder
/// logs and anything else written there are not.
pub fn is_published(requested: &str) -> bool {
    let parts: Vec<&str> = FsPath::new(requested)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    match parts.as_slice() {
        [dir, file] if parse_rendition_dir_name(dir).is_some() => {
            rendition_content_type(file).is_some()
        }
        ["thumbnails", file] => content_type_for_path(FsPath::new(file)).starts_with("image/"),
        _ => false,
    }
}

/// GET /static/{*path}
pub async fn serve_static(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let root = state.layout().static_dir();
    let file_path = resolve_under(root, &path)?;
    if !is_published(&path) {
        return Err(ApiError::NotFound("file not found".into()).into());
    }

    // Symlinks inside the static root must not lead out of it.
    let canonical_root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| ApiError::NotFound("file not found".into()))?;
    let canonical = tokio::fs::canonicalize(&file_path)
        .await
        .map_err(|_| ApiError::NotFound("file not found".into()))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(ApiError::NotFound("file not found".into()).into());
    }

    serve_file(&canonical, &headers).await
}

/// Stream a regular file, honouring a single-range `Range` header.
pub async fn serve_file(file_path: &FsPath, headers: &HeaderMap) -> Result<Response, AppError> {
    let meta = match tokio::fs::metadata(file_path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ApiError::NotFound("file not found".into()).into()),
    };
    let file_size = meta.len();
    let content_type = content_type_for_path(file_path);

    let mut file = tokio::fs::File::open(file_path)
        .await
        .map_err(|e| ApiError::Internal(format!("file open error: {e}")))?;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range_header(v, file_size));
    let range = match range {
        Some(Ok(range)) => range,
        Some(Err(RangeError::Unsatisfiable)) => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{file_size}"))],
            )
                .into_response());
        }
        None | Some(Err(RangeError::Malformed)) => {
            let stream = tokio_util::io::ReaderStream::new(file);
            return Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, file_size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response());
        }
    };

    file.seek(std::io::SeekFrom::Start(range.start))
        .await
        .map_err(|e| ApiError::Internal(format!("seek error: {e}")))?;
    let stream = tokio_util::io::ReaderStream::new(file.take(range.len()));

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, range.len().to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end_inclusive, file_size),
            ),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
