use crate::ingestion::IngestionOrchestrator;
use crate::pipeline::{CycleOptions, PodcastOrchestrator};
use crate::types::{cutoff_from_hours, FeedItem, PipelineError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionOrchestrator>,
    pub podcasts: Arc<PodcastOrchestrator>,
    pub default_limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedRequest {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub success: bool,
    pub message: String,
    pub num_items_saved: usize,
    pub num_audio_files_uploaded: usize,
    pub feed_items: Vec<FeedItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodcastRequest {
    pub cutoff_hours: Option<i64>,
    pub batch_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PodcastResponse {
    pub success: bool,
    pub message: String,
    pub items_started: usize,
}

/// Error body: `{"success": false, "error": "...", "kind": "..."}`.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::SourceFetch(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Configuration(_) | PipelineError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

/// Empty body means all defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body).map_err(PipelineError::from)?)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/get-and-save-feed", post(get_and_save_feed))
        .route("/generate-podcast", post(generate_podcast))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Feedcast API is running" }))
}

async fn get_and_save_feed(State(state): State<AppState>, body: Bytes) -> Result<Json<FeedResponse>, ApiError> {
    let request: FeedRequest = parse_body(&body)?;
    let limit = request.limit.unwrap_or(state.default_limit);
    let offset = request.offset.unwrap_or(0);

    let outcome = state.ingestion.ingest(limit, offset).await?;

    Ok(Json(FeedResponse {
        success: true,
        message: format!(
            "Saved {} new items out of {} fetched, replicated {} audio files",
            outcome.saved,
            outcome.items.len(),
            outcome.uploaded
        ),
        num_items_saved: outcome.saved,
        num_audio_files_uploaded: outcome.uploaded,
        feed_items: outcome.items,
    }))
}

async fn generate_podcast(State(state): State<AppState>, body: Bytes) -> Result<Json<PodcastResponse>, ApiError> {
    let request: PodcastRequest = parse_body(&body)?;
    let options = CycleOptions {
        cutoff_age: request.cutoff_hours.map(cutoff_from_hours).transpose()?,
        batch_limit: request.batch_limit,
        podcast: None,
    };

    // Tasks keep running after the handles are dropped.
    let dispatch = state.podcasts.run_cycle_with(options).await?;
    info!("Podcast cycle dispatched {} items", dispatch.started);

    Ok(Json(PodcastResponse {
        success: true,
        message: format!("Started podcast generation for {} items", dispatch.started),
        items_started: dispatch.started,
    }))
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Feedcast API listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
