//! Prompt Gateway - a moderated, routed front door for generative models
//!
//! This library provides an HTTP service that accepts a prompt and a model
//! alias, screens the prompt against a content policy, routes it to one of
//! several backends and streams the result back as newline-delimited JSON:
//!
//! - **Content Moderation**: Banned-term and real-person image checks before any backend call
//! - **Alias Routing**: Client-facing aliases mapped to a provider and model
//! - **Provider Adapters**: Remote chat completions (SSE), a local generate endpoint, image synthesis
//! - **Streaming**: One JSON event per line, with client disconnects cancelling the backend call
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! The codebase is organized into three main layers:
//!
//! - [`core`]: Core functionality (config, errors, metrics, middleware, cancellation)
//! - [`api`]: HTTP handlers, request/response models, event stream encoding
//! - [`services`]: Moderation, routing, provider adapters and the orchestrator
//!
//! # Configuration
//!
//! Configuration comes from the YAML file named by `CONFIG_PATH`, or from
//! built-in defaults when it is unset. Environment overrides:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3000)
//! - `OPENAI_API_KEY`, `OPENAI_API_BASE`: Remote text and image backend
//! - `LOCAL_LLM_URL`: Local generate endpoint
//! - `REQUEST_TIMEOUT_SECS`: Upstream request timeout (default: none)
//! - `DOCUMENT_ROOT`, `DATA_DIR`: Static assets and storage sandbox

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{build_router, ApiDoc, AppState, Event, PromptRequest};
pub use core::{AppConfig, AppError, ProviderError, Result};
pub use services::{ModelRouter, ModerationEngine, Orchestrator, Outcome, ProviderKind};
