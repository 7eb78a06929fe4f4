//! Per-request pipeline: validate, moderate, route, dispatch, stream.
//!
//! ```text
//! RECEIVED -> VALIDATING -> MODERATING -> ROUTING -> DISPATCHING -> STREAMING
//!                 |              |                       |            |
//!                 v              v                       v            v
//!              FAILED         BLOCKED                 FAILED     COMPLETED | FAILED
//! ```
//!
//! Every path ends with exactly one terminal outcome and an explicit
//! [`EventSink::close`]. A client disconnect at any point is ABANDONED: the
//! in-flight adapter future is dropped and nothing more is emitted.

use crate::api::models::PromptRequest;
use crate::api::streaming::{Event, EventSink, GENERIC_ERROR_REASON};
use crate::core::config::AppConfig;
use crate::core::{get_metrics, get_request_id, ProviderError, TransportError, PROVIDER_CONTEXT};
use crate::services::model_router::ModelRouter;
use crate::services::moderation::ModerationEngine;
use crate::services::providers::ProviderRegistry;
use std::fmt;
use std::time::Instant;

/// Reason emitted when the streaming endpoint receives no prompt.
pub const MISSING_PROMPT_REASON: &str = "Prompt is required";

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Blocked,
    Completed,
    Failed,
    /// The client went away before a terminal event could be written
    Abandoned,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Blocked => "blocked",
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives requests through the pipeline. Holds only immutable configuration,
/// so one instance is shared by every connection.
pub struct Orchestrator {
    moderation: ModerationEngine,
    router: ModelRouter,
    providers: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(moderation: ModerationEngine, router: ModelRouter, providers: ProviderRegistry) -> Self {
        Self {
            moderation,
            router,
            providers,
        }
    }

    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> anyhow::Result<Self> {
        Ok(Self::new(
            ModerationEngine::from_config(&config.moderation),
            ModelRouter::from_config(&config.routing)?,
            ProviderRegistry::from_config(config, client),
        ))
    }

    pub fn moderation(&self) -> &ModerationEngine {
        &self.moderation
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Alias the request is served under: its own, or the router default.
    pub fn alias_for<'a>(&'a self, request: &'a PromptRequest) -> &'a str {
        request
            .model
            .as_deref()
            .unwrap_or_else(|| self.router.default_alias())
    }

    /// Run one request to its terminal outcome, then close the stream.
    pub async fn run(&self, request: &PromptRequest, sink: EventSink) -> Outcome {
        let (outcome, provider) = self.drive(request, &sink).await;

        get_metrics()
            .stream_outcomes
            .with_label_values(&[provider, outcome.as_str()])
            .inc();
        tracing::info!(
            request_id = %get_request_id(),
            provider = provider,
            outcome = %outcome,
            "Request finished"
        );
        sink.close();
        outcome
    }

    async fn drive(&self, request: &PromptRequest, sink: &EventSink) -> (Outcome, &'static str) {
        let Some(prompt) = request.prompt() else {
            tracing::warn!(request_id = %get_request_id(), "Request has no prompt");
            return (terminal(sink, Event::error(MISSING_PROMPT_REASON), Outcome::Failed).await, "none");
        };
        let alias = self.alias_for(request);

        let verdict = self.moderation.evaluate(prompt, alias);
        if let Some(reason) = verdict.reason {
            tracing::info!(
                request_id = %get_request_id(),
                model = %alias,
                reason = %reason,
                "Prompt blocked by content policy"
            );
            get_metrics()
                .moderation_blocks
                .with_label_values(&[reason.as_str()])
                .inc();
            return (terminal(sink, Event::blocked(reason), Outcome::Blocked).await, "none");
        }

        let route = self.router.resolve(alias);
        let provider = route.provider.as_str();

        let Some(adapter) = self.providers.get(route.provider) else {
            tracing::error!(
                request_id = %get_request_id(),
                provider = provider,
                "No adapter registered for provider"
            );
            return (server_error(sink).await, provider);
        };

        tracing::debug!(
            request_id = %get_request_id(),
            model = %alias,
            provider = provider,
            model_id = %route.model_id,
            "Dispatching request"
        );

        let start = Instant::now();
        let result = PROVIDER_CONTEXT
            .scope(provider.to_string(), async {
                tokio::select! {
                    result = adapter.run(prompt, &route.model_id, sink) => result,
                    _ = sink.cancelled() => Err(ProviderError::Transport(TransportError)),
                }
            })
            .await;
        get_metrics()
            .provider_latency
            .with_label_values(&[provider])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(()) => Outcome::Completed,
            Err(e) if e.is_disconnect() => {
                tracing::info!(
                    request_id = %get_request_id(),
                    provider = provider,
                    "Client disconnected mid-stream"
                );
                Outcome::Abandoned
            }
            Err(e) => {
                tracing::error!(
                    request_id = %get_request_id(),
                    provider = provider,
                    model_id = %route.model_id,
                    error = %e,
                    "Provider failed"
                );
                server_error(sink).await
            }
        };
        (outcome, provider)
    }
}

/// Write the terminal event; a vanished client turns the outcome into Abandoned.
async fn terminal(sink: &EventSink, event: Event, outcome: Outcome) -> Outcome {
    match sink.emit(event).await {
        Ok(()) => outcome,
        Err(TransportError) => Outcome::Abandoned,
    }
}

async fn server_error(sink: &EventSink) -> Outcome {
    terminal(sink, Event::error(GENERIC_ERROR_REASON), Outcome::Failed).await
}
