//! Business logic for the prompt gateway.
//!
//! Moderation and routing are pure policy; the orchestrator ties them to the
//! provider adapters and drives each request to a terminal outcome.

pub mod model_router;
pub mod moderation;
pub mod orchestrator;
pub mod providers;

// Re-export commonly used types
pub use model_router::{ModelRouter, ProviderKind, Route};
pub use moderation::{ModerationEngine, ModerationResult};
pub use orchestrator::{Orchestrator, Outcome};
pub use providers::{create_http_client, ProviderAdapter, ProviderRegistry};
