//! HTTP surface: live stream, recognition history and one-shot analysis.

use crate::engine::{self, SourceSlot};
use crate::error::ApiError;
use crate::uploads;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facewatch_core::encode::{self, STREAM_CONTENT_TYPE};
use facewatch_core::history::{RecognitionHistory, RECENT_LIMIT};
use facewatch_core::pipeline::{OneShotPipeline, SharedRecognizer, StreamConfig};
use facewatch_core::types::{HistoryEntry, Prediction};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const ONE_SHOT_JPEG_QUALITY: u8 = 90;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub recognizer: SharedRecognizer,
    /// Identity names, fixed at startup.
    pub labels: Arc<[String]>,
    pub history: Arc<RecognitionHistory>,
    pub slot: Arc<SourceSlot>,
    pub stream_config: StreamConfig,
    pub test_images_dir: PathBuf,
}

impl AppState {
    fn one_shot(&self) -> OneShotPipeline {
        OneShotPipeline::new(Arc::clone(&self.recognizer))
    }
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let static_images = ServeDir::new(&state.test_images_dir);

    Router::new()
        .route("/video_feed", get(video_feed_handler))
        .route("/history", get(history_handler))
        .route("/upload", post(upload_handler))
        .route("/analyze-test-image", post(analyze_test_image_handler))
        .route("/test-images", get(test_images_handler))
        .route("/status", get(status_handler))
        .nest_service("/static/test_images", static_images)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct PredictionView {
    identity: String,
    /// Percentage, two decimals.
    confidence: f32,
}

impl From<Prediction> for PredictionView {
    fn from(p: Prediction) -> Self {
        Self {
            confidence: p.confidence_pct(),
            identity: p.identity,
        }
    }
}

#[derive(Serialize)]
struct AnalysisResponse {
    success: bool,
    predictions: Vec<PredictionView>,
    image_data: String,
}

#[derive(Deserialize)]
struct AnalyzeTestImageRequest {
    #[serde(default)]
    image_name: String,
}

#[derive(Serialize)]
struct TestImage {
    name: String,
    url: String,
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    labels: Vec<String>,
    history_len: usize,
    stream_active: bool,
    cadence: u64,
}

async fn video_feed_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let lease = state.slot.lease()?;
    let rx = engine::spawn_stream(
        lease,
        Arc::clone(&state.recognizer),
        Arc::clone(&state.history),
        state.stream_config,
    )?;

    let parts = ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>);
    Ok(([(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)], Body::from_stream(parts)).into_response())
}

async fn history_handler(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.recent(RECENT_LIMIT))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::BadRequest("no file selected".into()));
        }
        if !uploads::allowed_file(&filename) {
            return Err(ApiError::BadRequest("file type not allowed".into()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        tracing::info!(filename = %filename, bytes = data.len(), "analyzing upload");
        return analyze_bytes(&state, data).await.map(Json);
    }

    Err(ApiError::BadRequest("no file part in request".into()))
}

async fn analyze_test_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeTestImageRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let name = request.image_name;
    if !uploads::is_safe_image_name(&name) {
        return Err(ApiError::BadRequest("invalid image name".into()));
    }

    let path = state.test_images_dir.join(&name);
    if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
        return Err(ApiError::NotFound(format!("test image not found: {name}")));
    }
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read {name}: {e}")))?;

    tracing::info!(image = %name, "analyzing test image");
    analyze_bytes(&state, data.into()).await.map(Json)
}

/// Decode, analyze and encode one image off the async runtime.
async fn analyze_bytes(state: &AppState, data: Bytes) -> Result<AnalysisResponse, ApiError> {
    let pipeline = state.one_shot();
    tokio::task::spawn_blocking(move || {
        let frame =
            encode::decode_image(&data).map_err(|e| ApiError::BadRequest(format!("cannot read image: {e}")))?;
        let analysis = pipeline.analyze(&frame);
        let jpeg = encode::encode_jpeg(&analysis.annotated, ONE_SHOT_JPEG_QUALITY)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok::<_, ApiError>(AnalysisResponse {
            success: true,
            predictions: analysis.predictions.into_iter().map(PredictionView::from).collect(),
            image_data: encode::data_uri(&jpeg),
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("analysis worker failed: {e}")))?
}

async fn test_images_handler(State(state): State<AppState>) -> Result<Json<Vec<TestImage>>, ApiError> {
    let mut entries = match tokio::fs::read_dir(&state.test_images_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Json(Vec::new())),
        Err(e) => return Err(ApiError::Internal(format!("cannot list test images: {e}"))),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ApiError::Internal(format!("cannot list test images: {e}")))?
    {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if let Some(name) = entry.file_name().to_str() {
            if is_file && uploads::allowed_file(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    Ok(Json(
        names
            .into_iter()
            .map(|name| TestImage {
                url: format!("/static/test_images/{name}"),
                name,
            })
            .collect(),
    ))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        labels: state.labels.to_vec(),
        history_len: state.history.len(),
        stream_active: state.slot.is_active(),
        cadence: state.stream_config.process_every_n_frames,
    })
}
