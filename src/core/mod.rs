//! Core functionality for the prompt gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Request context for logging
//! - Metrics collection
//! - HTTP middleware
//! - Stream cancellation

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, ServerConfig, StorageConfig};
pub use error::{AppError, ProviderError, Result, TransportError};
pub use logging::{generate_request_id, get_provider_context, get_request_id, PROVIDER_CONTEXT, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{request_id_middleware, MetricsMiddleware};
