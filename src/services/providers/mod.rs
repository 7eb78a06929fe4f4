//! Completion backends behind one polymorphic interface.
//!
//! Each adapter drives one backend and pushes whatever it produces through
//! the session's [`EventSink`]. The orchestrator only ever sees
//! [`ProviderAdapter`]; adding a backend means adding an adapter and a
//! [`ProviderKind`] variant.

pub mod image;
pub mod local_text;
pub mod remote_text;
pub mod sse;

pub use image::ImageAdapter;
pub use local_text::LocalTextAdapter;
pub use remote_text::RemoteTextAdapter;

use crate::api::streaming::EventSink;
use crate::core::config::AppConfig;
use crate::core::{get_provider_context, get_request_id, ProviderError};
use crate::services::model_router::ProviderKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Longest upstream error body kept for logs.
const MAX_ERROR_BODY: usize = 512;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Generate a completion for `prompt` with `model_id`, emitting zero or
    /// more events before returning.
    async fn run(&self, prompt: &str, model_id: &str, sink: &EventSink)
        -> Result<(), ProviderError>;
}

/// Adapters keyed by the provider kind they serve.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the standard three backends from configuration.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RemoteTextAdapter::new(
            client.clone(),
            &config.remote,
        )));
        registry.register(Arc::new(LocalTextAdapter::new(
            client.clone(),
            &config.local,
        )));
        registry.register(Arc::new(ImageAdapter::new(
            client,
            config.image_api_base(),
            &config.remote.api_key,
            &config.image.size,
        )));
        registry
    }

    /// Register an adapter, replacing any previous one of the same kind.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Create the shared upstream HTTP client with connection pooling.
///
/// No timeout is applied unless `request_timeout_secs` is configured.
pub fn create_http_client(config: &AppConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60));

    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder.build()
}

/// Turn a non-success upstream response into a [`ProviderError`].
pub(crate) async fn upstream_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let mut message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    tracing::warn!(
        request_id = %get_request_id(),
        provider = %get_provider_context(),
        status = status,
        "Upstream returned an error status"
    );
    ProviderError::Upstream { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_config_has_all_kinds() {
        let config = AppConfig::default();
        let registry = ProviderRegistry::from_config(&config, reqwest::Client::new());

        assert_eq!(registry.len(), 3);
        for kind in [
            ProviderKind::RemoteText,
            ProviderKind::LocalText,
            ProviderKind::Image,
        ] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(ProviderKind::LocalText).is_none());

        let config = AppConfig::default();
        registry.register(Arc::new(LocalTextAdapter::new(
            reqwest::Client::new(),
            &config.local,
        )));
        registry.register(Arc::new(LocalTextAdapter::new(
            reqwest::Client::new(),
            &config.local,
        )));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_http_client() {
        let mut config = AppConfig::default();
        assert!(create_http_client(&config).is_ok());

        config.request_timeout_secs = Some(5);
        assert!(create_http_client(&config).is_ok());
    }
}
