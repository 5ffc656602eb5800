use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, Method, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vodpack_core::error::ApiError;
use vodpack_core::types::PackagingFormat;
use vodpack_db::repo::assets::AssetRow;
use vodpack_ingest::IngestError;
use vodpack_ingest::layout::{rendition_url, thumbnail_url};
use vodpack_ingest::orchestrator::{IngestReceipt, IngestRequest, ThumbnailUpload};

use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload).layer(upload_limit))
        .route("/videos", get(list_videos))
        .route("/videos/{id}", get(get_video))
        .route("/thumbnail/{id}", get(get_thumbnail))
        .route("/static/{*path}", get(crate::streaming::serve_static))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_LENGTH])
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("database check failed: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct UploadResponse {
    video_id: String,
    hls_url: String,
    dash_url: String,
    duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
}

impl From<IngestReceipt> for UploadResponse {
    fn from(r: IngestReceipt) -> Self {
        Self {
            video_id: r.video_id,
            hls_url: r.hls_url,
            dash_url: r.dash_url,
            duration: r.duration,
            thumbnail: r.thumbnail,
        }
    }
}

/// POST /upload
///
/// Multipart fields: `video_name` (text), `file` (required), `thumbnail` (optional).
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut request = IngestRequest::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video_name" => request.display_name = field.text().await?,
            "file" => {
                // streamed to disk chunk by chunk; dropped on error
                let mut staged = state.ingestor.stage_upload().await?;
                while let Some(chunk) = field.chunk().await? {
                    staged
                        .write_chunk(&chunk)
                        .await
                        .map_err(IngestError::Storage)?;
                }
                request.video = Some(staged);
            }
            "thumbnail" => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                // browsers send an empty part when no file was picked
                if !data.is_empty() {
                    request.thumbnail = Some(ThumbnailUpload { filename, data });
                }
            }
            other => tracing::debug!(field = %other, "ignoring unknown multipart field"),
        }
    }

    let receipt = state.ingestor.ingest(request).await?;
    Ok(Json(receipt.into()))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct VideoSummary {
    id: String,
    name: String,
    duration: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
}

impl From<AssetRow> for VideoSummary {
    fn from(row: AssetRow) -> Self {
        Self {
            thumbnail: row.thumbnail.as_ref().map(|_| thumbnail_url(&row.id)),
            timestamp: uploaded_at(row.upload_ts),
            id: row.id,
            name: row.name,
            duration: row.duration,
        }
    }
}

#[derive(Debug, Serialize)]
struct VideoListResponse {
    videos: Vec<VideoSummary>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct VideoDetail {
    id: String,
    name: String,
    duration: String,
    timestamp: DateTime<Utc>,
    hls_url: String,
    dash_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
}

impl From<AssetRow> for VideoDetail {
    fn from(row: AssetRow) -> Self {
        Self {
            hls_url: rendition_url(&row.id, PackagingFormat::Hls),
            dash_url: rendition_url(&row.id, PackagingFormat::Dash),
            thumbnail: row.thumbnail.as_ref().map(|_| thumbnail_url(&row.id)),
            timestamp: uploaded_at(row.upload_ts),
            id: row.id,
            name: row.name,
            duration: row.duration,
        }
    }
}

fn uploaded_at(upload_ts_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(upload_ts_ms).unwrap_or_default()
}

/// GET /videos, newest first.
async fn list_videos(State(state): State<AppState>) -> Result<Json<VideoListResponse>, AppError> {
    let videos: Vec<VideoSummary> = state
        .catalog()
        .list_recent()
        .await?
        .into_iter()
        .map(VideoSummary::from)
        .collect();

    Ok(Json(VideoListResponse {
        count: videos.len(),
        videos,
    }))
}

async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VideoDetail>, AppError> {
    let row = state
        .catalog()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("video not found".into()))?;
    Ok(Json(row.into()))
}

/// GET /thumbnail/{id}
async fn get_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let row = state
        .catalog()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("video not found".into()))?;
    let path = row
        .thumbnail
        .ok_or_else(|| ApiError::NotFound("thumbnail not available".into()))?;

    crate::streaming::serve_file(std::path::Path::new(&path), &headers).await
}
