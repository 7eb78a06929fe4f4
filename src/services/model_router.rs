//! Alias resolution.
//!
//! Maps the client-facing model tier ("fast", "smart", "image", ...) to the
//! concrete backend and model identifier. The table is closed and immutable;
//! anything it does not recognise resolves like the default alias.

use crate::core::config::RoutingConfig;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Backend family. The only input to adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    RemoteText,
    LocalText,
    Image,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::RemoteText => "remote_text",
            ProviderKind::LocalText => "local_text",
            ProviderKind::Image => "image",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved (provider, model id) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub provider: ProviderKind,
    pub model_id: String,
}

#[derive(Debug, Clone)]
pub struct ModelRouter {
    routes: HashMap<String, Route>,
    default_alias: String,
    default_route: Route,
}

impl ModelRouter {
    /// Build the router, failing if the default alias is not in the table.
    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        let routes: HashMap<String, Route> = config
            .aliases
            .iter()
            .map(|(alias, entry)| {
                (
                    alias.clone(),
                    Route {
                        provider: entry.provider,
                        model_id: entry.model.clone(),
                    },
                )
            })
            .collect();

        let Some(default_route) = routes.get(&config.default_alias).cloned() else {
            bail!(
                "default alias '{}' is not present in the alias table",
                config.default_alias
            );
        };

        Ok(Self {
            routes,
            default_alias: config.default_alias.clone(),
            default_route,
        })
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    /// Resolve an alias. Unknown aliases get the default route.
    pub fn resolve(&self, alias: &str) -> Route {
        self.routes
            .get(alias)
            .cloned()
            .unwrap_or_else(|| self.default_route.clone())
    }

    /// Whether `alias` is an entry of the table rather than a fallback.
    pub fn is_known(&self, alias: &str) -> bool {
        self.routes.contains_key(alias)
    }

    pub fn log_routes(&self) {
        let mut aliases: Vec<_> = self.routes.iter().collect();
        aliases.sort_by(|a, b| a.0.cmp(b.0));
        for (alias, route) in aliases {
            tracing::info!(
                alias = %alias,
                provider = %route.provider,
                model = %route.model_id,
                default = (alias == &self.default_alias),
                "Route registered"
            );
        }
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default()).expect("built-in alias table is consistent")
    }
}
