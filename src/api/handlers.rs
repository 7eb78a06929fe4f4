//! HTTP request handlers for the generation endpoints.
//!
//! This module contains the streaming and non-streaming generation handlers,
//! the ping endpoint and the Prometheus metrics endpoint.

use crate::api::models::{ErrorResponse, GenerateResponse, PingResponse, PromptRequest};
use crate::api::streaming::{ndjson_response, Event, EventSink};
use crate::core::config::AppConfig;
use crate::core::logging::{get_request_id, REQUEST_ID};
use crate::core::{AppError, Result, StreamCancelHandle};
use crate::services::orchestrator::{Orchestrator, MISSING_PROMPT_REASON};
use crate::services::ProviderKind;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}

/// Stream a completion as newline-delimited JSON events.
///
/// The response is committed immediately with status 200; validation and
/// moderation failures arrive as the single event of the stream.
#[utoipa::path(
    post,
    path = "/api/ai/stream",
    tag = "ai",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "One JSON event per line: text, image, blocked or error", body = String, content_type = "text/plain")
    )
)]
pub async fn stream_completion(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = PromptRequest::parse_lenient(&body);
    let request_id = get_request_id();

    tracing::debug!(
        request_id = %request_id,
        model = ?request.model,
        prompt_len = request.prompt.as_deref().map_or(0, str::len),
        "Stream request received"
    );

    let cancel = StreamCancelHandle::new();
    let (sink, rx) = EventSink::channel(cancel.clone());

    // The task-local scope does not cross `spawn`; re-enter it.
    tokio::spawn(REQUEST_ID.scope(request_id.clone(), async move {
        state.orchestrator.run(&request, sink).await;
    }));

    ndjson_response(rx, cancel, request_id)
}

/// Run the same pipeline and return the collected result in one response.
#[utoipa::path(
    post,
    path = "/api/ai/generate",
    tag = "ai",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "Generated text or image", body = GenerateResponse),
        (status = 400, description = "Prompt missing", body = ErrorResponse),
        (status = 403, description = "Prompt blocked by content policy", body = ErrorResponse),
        (status = 502, description = "Provider failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body))]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>> {
    let request = PromptRequest::parse_lenient(&body);
    if request.prompt().is_none() {
        return Err(AppError::BadRequest(MISSING_PROMPT_REASON.to_string()));
    }

    let (sink, mut rx) = EventSink::channel(StreamCancelHandle::new());
    let collect = async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    };
    let (_, events) = tokio::join!(state.orchestrator.run(&request, sink), collect);

    let alias = state.orchestrator.alias_for(&request).to_string();
    let route = state.orchestrator.router().resolve(&alias);

    let mut text = String::new();
    let mut image = None;
    for event in events {
        match event {
            Event::TextFragment { data } => text.push_str(&data),
            Event::ImageResult { data } => image = Some(data),
            Event::Blocked { reason } => return Err(AppError::Blocked(reason)),
            Event::Error { reason } => return Err(AppError::BadGateway(reason)),
        }
    }

    let is_image = route.provider == ProviderKind::Image;
    Ok(Json(GenerateResponse {
        model: alias,
        provider: route.provider.to_string(),
        text: (!is_image).then_some(text),
        image,
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/ping",
    tag = "system",
    responses((status = 200, description = "Server is up", body = PingResponse))
)]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
        time: chrono::Utc::now(),
    })
}

/// Prometheus metrics endpoint.
#[tracing::instrument]
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}
