use crate::annotate;
use crate::catalog::CatalogIndex;
use crate::config::{PipelineConfig, ServerConfig};
use crate::detection::RawDetection;
use crate::error::ScanError;
use crate::pipeline::{ImageReport, Pipeline};
use crate::source::parse_detections;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_IMAGE_ID: &str = "upload";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_file_size: usize,
}

/// Resolve request body
#[derive(Deserialize)]
pub struct ResolveRequest {
    pub image_id: Option<String>,
    pub detections: Vec<RawDetection>,
}

/// Resolve response
#[derive(Serialize)]
pub struct ResolveResponse {
    #[serde(flatten)]
    pub report: ImageReport,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub catalog_size: usize,
    pub pipeline: PipelineConfig,
    pub max_file_size_bytes: usize,
}

/// Build the router; split from `run` so it can be driven without a socket
pub fn router(state: AppState) -> Router {
    let max_file_size = state.max_file_size;
    Router::new()
        .route("/resolve", post(handle_resolve))
        .route("/annotate", post(handle_annotate))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let catalog = match &config.catalog_path {
        Some(path) => CatalogIndex::load_json(path)?,
        None => {
            tracing::warn!("No catalog given; starting with an empty catalog");
            CatalogIndex::default()
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        pipeline: Arc::new(Pipeline::new(config.pipeline, Arc::new(catalog))),
        max_file_size: config.max_file_size,
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle JSON resolve requests
async fn handle_resolve(
    State(state): State<AppState>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, ScanError> {
    let Json(request) = payload.map_err(|e| ScanError::InvalidRequest(e.body_text()))?;
    let start = Instant::now();
    let image_id = request
        .image_id
        .unwrap_or_else(|| DEFAULT_IMAGE_ID.to_string());

    let report = state.pipeline.process(&image_id, request.detections);
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Resolved {} in {}ms ({} cards)",
        image_id,
        processing_time_ms,
        report.summary.cards
    );

    Ok(Json(ResolveResponse {
        report,
        processing_time_ms,
    }))
}

/// Handle annotate requests: image plus detections in, PNG overlay out
async fn handle_annotate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ScanError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut detections: Option<Vec<RawDetection>> = None;
    let mut image_id: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScanError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    ScanError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "detections" => {
                let text = field.text().await.map_err(|e| {
                    ScanError::InvalidRequest(format!("Failed to read detections: {}", e))
                })?;
                detections = Some(parse_detections(&text).map_err(|e| {
                    ScanError::InvalidRequest(format!("Invalid detections: {}", e))
                })?);
            }
            "image_id" => {
                image_id = Some(field.text().await.map_err(|e| {
                    ScanError::InvalidRequest(format!("Invalid image id: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(ScanError::MissingFile)?;
    if data.len() > state.max_file_size {
        return Err(ScanError::PayloadTooLarge {
            size: data.len(),
            max: state.max_file_size,
        });
    }
    let detections = detections
        .ok_or_else(|| ScanError::InvalidRequest("Missing detections field".to_string()))?;
    let image_id = image_id.unwrap_or_else(|| DEFAULT_IMAGE_ID.to_string());

    let image = image::load_from_memory(&data)
        .map_err(|e| ScanError::ImageDecode(e.to_string()))?;

    let report = state.pipeline.process(&image_id, detections);
    let png = annotate::render_png(&image, &report.cards)?;

    tracing::info!(
        "Annotated {} ({}x{}) in {}ms",
        image_id,
        image.width(),
        image.height(),
        start.elapsed().as_millis()
    );

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        catalog_size: state.pipeline.catalog().len(),
        pipeline: state.pipeline.config().clone(),
        max_file_size_bytes: state.max_file_size,
    })
}
