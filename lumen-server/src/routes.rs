use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use lumen_core::{GenerationRequest, Generator, ModelConfig};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::responses::{self, SubmitMode};

// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub generator: Generator,
}

type SharedState = Arc<AppState>;

#[derive(Deserialize, Debug, Default)]
pub struct StatusQuery {
    pub id: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/generate", post(generate))
        .route("/api/generate/wait", post(generate_and_wait))
        .route("/api/status", get(check_status))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    "Lumen is running"
}

async fn list_models(State(state): State<SharedState>) -> Json<Vec<ModelConfig>> {
    Json(state.generator.registry().iter().cloned().collect())
}

/// A body that is not valid JSON for the request shape is treated as empty, so
/// the caller gets the usual validation error instead of a raw rejection.
fn request_or_default(body: Result<Json<GenerationRequest>, JsonRejection>) -> GenerationRequest {
    match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(%rejection, "undecodable generation request body");
            GenerationRequest::default()
        }
    }
}

/// POST /api/generate: create the job and return its id right away.
async fn generate(
    State(state): State<SharedState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let request = request_or_default(body);
    info!(model = ?request.model, "received generation request");

    match state.generator.submitter().submit(&request).await {
        Ok(job) => Json(json!({ "status": "processing", "id": job.id })).into_response(),
        Err(err) => responses::generate_error(&err, SubmitMode::Async),
    }
}

/// POST /api/generate/wait: block until the image is ready or the wait ceiling
/// is hit.
async fn generate_and_wait(
    State(state): State<SharedState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let request = request_or_default(body);
    info!(model = ?request.model, "received synchronous generation request");

    match state.generator.submitter().submit_and_wait(&request).await {
        Ok(image_url) => {
            Json(json!({ "status": "success", "imageUrl": image_url })).into_response()
        }
        Err(err) => responses::generate_error(&err, SubmitMode::Wait),
    }
}

/// GET /api/status?id=...
async fn check_status(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state.generator.poller().check_status(query.id.as_deref()).await {
        Ok(outcome) => responses::status_outcome(outcome),
        Err(err) => responses::status_error(&err),
    }
}
