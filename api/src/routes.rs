/// HTTP route handlers for Onetime.
use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use onetime_shared::validation::{is_valid_format_id, sanitize_filename};
use onetime_shared::{MediaError, VideoMetadata};

use crate::render;
use crate::AppState;

/// Pipe capacity between yt-dlp's stdout and the response body.
const STREAM_BUFFER: usize = 64 * 1024;

// ====== REQUEST / RESPONSE TYPES ======

#[derive(Deserialize)]
pub struct SubmitForm {
    #[serde(rename = "videoURL", default)]
    pub video_url: String,
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub filename: String,
}

#[derive(Deserialize)]
pub struct VideoRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct VideoResponse {
    pub url: String,
    pub id: String,
    pub author: String,
    pub title: String,
    pub thumbnail: String,
    pub medias: Vec<MediaEntry>,
    pub error: bool,
}

#[derive(Serialize)]
pub struct MediaEntry {
    pub format_id: String,
    pub quality: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub ext: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
}

impl From<VideoMetadata> for VideoResponse {
    fn from(meta: VideoMetadata) -> Self {
        let medias = meta
            .formats
            .iter()
            .map(|f| MediaEntry {
                format_id: f.format_id.clone(),
                quality: f.quality_label.clone(),
                label: f.display_label(),
                width: f.width,
                height: f.height,
                ext: f.extension.clone(),
            })
            .collect();
        Self {
            url: meta.source_url,
            id: meta.id,
            author: meta.author,
            title: meta.title,
            thumbnail: meta.thumbnail_url,
            medias,
            error: false,
        }
    }
}

/// HTTP status for a core error.
pub fn status_for(err: &MediaError) -> StatusCode {
    match err {
        MediaError::InvalidUrl(_) | MediaError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        MediaError::ExtractionFailed(_) | MediaError::MalformedMetadata(_) => StatusCode::BAD_GATEWAY,
        MediaError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        MediaError::DownloadFailed(_) | MediaError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

// ====== FRONT-END ROUTES ======

/// POST /submit - Render the video details fragment
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SubmitForm>,
) -> Result<Html<String>, (StatusCode, String)> {
    let url = form.video_url.trim();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Invalid or unsupported video URL".to_string()));
    }

    let meta = state.fetcher.fetch(url).await.map_err(|e| {
        warn!("Metadata fetch failed for {}: {}", url, e);
        let message = if e.is_client_error() {
            "Invalid or unsupported video URL".to_string()
        } else {
            format!("Error fetching video meta data: {}", e)
        };
        (status_for(&e), message)
    })?;

    if meta.formats.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "No downloadable formats found for this video".to_string(),
        ));
    }

    Ok(Html(render::video_details(&meta)))
}

/// GET /download - Stream the selected format straight from yt-dlp
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, (StatusCode, String)> {
    if query.url.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing video page URL".to_string()));
    }
    if !is_valid_format_id(&query.format) {
        return Err((StatusCode::BAD_REQUEST, "Invalid format".to_string()));
    }
    let filename = sanitize_filename(&query.filename);

    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("download", id = %request_id, format = %query.format);

    let download = state
        .downloader
        .open(&query.url, &query.format)
        .instrument(span.clone())
        .await
        .map_err(|e| {
            warn!("Download {} rejected: {}", request_id, e);
            let message = if e.is_client_error() {
                e.to_string()
            } else {
                "Failed to download video".to_string()
            };
            (status_for(&e), message)
        })?;

    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(
        async move {
            let result = download.pipe(&mut writer, cancel).await;
            drop(writer);
            let _ = done_tx.send(result);
        }
        .instrument(span),
    );

    // Nothing is committed until yt-dlp writes its first byte, so a tool that
    // fails up front still gets a proper error status.
    let mut chunks = ReaderStream::new(reader);
    let first = match chunks.next().await {
        Some(chunk) => chunk,
        None => {
            return match done_rx.await {
                Ok(Ok(_)) => Ok(attachment(&filename, Body::empty())),
                Ok(Err(e)) => {
                    warn!("Download {} failed before any output: {}", request_id, e);
                    Err((status_for(&e), "Failed to download video".to_string()))
                }
                Err(_) => Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to download video".to_string(),
                )),
            };
        }
    };

    // After the pipe drains, surface a failed exit as a body error so the
    // client sees an aborted transfer instead of a clean end of file.
    let outcome = stream::once(done_rx).filter_map(|outcome| async move {
        match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(Err::<Bytes, io::Error>(io::Error::new(io::ErrorKind::Other, e.to_string()))),
            Err(_) => Some(Err(io::Error::new(io::ErrorKind::Other, "download task ended unexpectedly"))),
        }
    });
    // Dropping the body (client gone) drops the guard, which cancels the pipe.
    let body = stream::iter(Some(first))
        .chain(chunks)
        .chain(outcome)
        .map(move |chunk| {
            let _guard = &guard;
            chunk
        });

    info!("Streaming {} as {:?}", query.url, filename);
    Ok(attachment(&filename, Body::from_stream(body)))
}

/// `200 OK` mp4 attachment response.
fn attachment(filename: &str, body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(filename)),
        ],
        body,
    )
        .into_response()
}

// ====== JSON ROUTES ======

/// POST /api/video - Metadata as JSON
pub async fn video_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VideoRequest>,
) -> Result<Json<VideoResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.fetcher.fetch(body.url.trim()).await {
        Ok(meta) => Ok(Json(meta.into())),
        Err(e) => {
            warn!("Metadata fetch failed for {}: {}", body.url, e);
            Err((
                status_for(&e),
                Json(ErrorBody {
                    error: true,
                    message: e.to_string(),
                }),
            ))
        }
    }
}

/// GET /healthz
pub async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if let Some(redis) = &state.redis {
        if let Err(e) = redis.ping().await {
            warn!("Health check failed: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "cache unavailable");
        }
    }
    (StatusCode::OK, "ok")
}
