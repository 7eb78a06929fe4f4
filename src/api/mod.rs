//! API layer for the prompt gateway.
//!
//! This module contains all HTTP handlers, request/response models,
//! the event stream encoding and the router that ties them together.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod streaming;

// Re-export commonly used types
pub use handlers::{generate, metrics_handler, ping, stream_completion, AppState};
pub use models::{GenerateResponse, PromptRequest};
pub use streaming::{ndjson_response, parse_ndjson, Event, EventSink};

use crate::core::{request_id_middleware, MetricsMiddleware};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::stream_completion,
        handlers::generate,
        handlers::ping,
        storage::fs_write,
        storage::fs_read,
        storage::session_save,
        storage::session_load,
    ),
    components(schemas(
        models::PromptRequest,
        models::GenerateResponse,
        models::FsWriteRequest,
        models::FsWriteResponse,
        models::FsReadRequest,
        models::FsReadResponse,
        models::SessionSaveResponse,
        models::PingResponse,
        models::ErrorResponse,
        models::ErrorDetail,
    )),
    tags(
        (name = "ai", description = "Moderated, routed generation"),
        (name = "storage", description = "Sandboxed file and session persistence"),
        (name = "system", description = "Liveness")
    ),
    info(
        title = "Prompt Gateway API",
        description = "Moderates prompts, routes them to a text or image backend and streams the result"
    )
)]
pub struct ApiDoc;

/// Build the application router with all endpoints and middleware.
///
/// Requests that match no route are served from `storage.document_root`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.storage.document_root);

    let api_routes = Router::new()
        .route("/api/ai/stream", post(stream_completion))
        .route("/api/ai/generate", post(generate))
        .route("/api/fs/write", post(storage::fs_write))
        .route("/api/fs/read", post(storage::fs_read))
        .route("/api/session/save", post(storage::session_save))
        .route("/api/session/load", get(storage::session_load))
        .route("/api/ping", get(ping))
        .with_state(state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .route("/metrics", get(metrics_handler))
        .fallback_service(static_files)
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
