use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use thiserror::Error;
use tillroll_ocr::{OcrBackend, PipelineError, RasterError, ReceiptPipeline, ReceiptRecord};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;

/// Response envelope shared by the scan endpoints.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

pub fn router<R: OcrBackend + 'static>(pipeline: ReceiptPipeline<R>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/scan-receipt/", post(scan_receipt::<R>))
        .route("/scan-document/", post(scan_document::<R>))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Wildcard origins cannot carry credentials.
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Scan one receipt image.
async fn scan_receipt<R: OcrBackend + 'static>(
    State(pipeline): State<ReceiptPipeline<R>>,
    multipart: Multipart,
) -> Result<Json<Data<ReceiptRecord>>, ApiError> {
    let upload = read_upload(multipart).await?;
    tracing::info!(file = %upload.file_name, bytes = upload.data.len(), "scanning receipt");

    let result = pipeline.process_image_bytes(upload.data).await?;
    Ok(Json(Data { data: result.record }))
}

/// Scan an image or a multi-page PDF; one record per page.
async fn scan_document<R: OcrBackend + 'static>(
    State(pipeline): State<ReceiptPipeline<R>>,
    multipart: Multipart,
) -> Result<Json<Data<Vec<ReceiptRecord>>>, ApiError> {
    let upload = read_upload(multipart).await?;
    tracing::info!(file = %upload.file_name, bytes = upload.data.len(), "scanning document");

    let ext = upload.extension();
    let results = pipeline.process_bytes(upload.data, &ext).await?;
    Ok(Json(Data { data: results.into_iter().map(|r| r.record).collect() }))
}

// ── Upload handling ───────────────────────────────────────────────────────────

struct Upload {
    file_name: String,
    data: Vec<u8>,
}

impl Upload {
    fn extension(&self) -> String {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase()
    }
}

/// Take the first field named `file`, or else the first field carrying a file name.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Upload error: {e}")))?
    {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Read error: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }
        return Ok(Upload { file_name, data: data.to_vec() });
    }
    Err(ApiError::BadRequest("No file provided".to_string()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e {
                PipelineError::Preprocess(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Raster(RasterError::Failed(_) | RasterError::NoPages) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::Ocr(_) | PipelineError::Raster(RasterError::Spawn { .. }) => {
                    StatusCode::BAD_GATEWAY
                }
                PipelineError::Io(_)
                | PipelineError::Raster(RasterError::Io(_))
                | PipelineError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Scan failed: {self}");
        } else {
            tracing::warn!("Scan rejected: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
