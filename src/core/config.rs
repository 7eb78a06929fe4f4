//! Configuration management for the prompt gateway.
//!
//! Configuration is loaded once at startup, either from a YAML file (with
//! environment variable expansion) or from built-in defaults, and then
//! overridden by a handful of environment variables. The resulting
//! [`AppConfig`] is immutable for the lifetime of the process and is handed to
//! each component through its constructor.

use crate::services::model_router::ProviderKind;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Optional whole-request timeout for upstream calls, in seconds.
    /// `None` leaves upstream calls unbounded.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Remote hosted text model (OpenAI-compatible chat completions)
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Locally hosted text model (Ollama-compatible generate endpoint)
    #[serde(default)]
    pub local: LocalConfig,

    /// Image synthesis backend
    #[serde(default)]
    pub image: ImageConfig,

    /// Content policy
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Alias table
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Static assets, data directory and permission flags
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Remote text provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_remote_api_base")]
    pub api_base: String,

    /// Bearer token; an empty key means the remote provider is unavailable
    #[serde(default)]
    pub api_key: String,

    /// System instruction sent ahead of every user prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_remote_api_base(),
            api_key: String::new(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Local text provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Full URL of the streaming generate endpoint
    #[serde(default = "default_local_endpoint")]
    pub endpoint: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            endpoint: default_local_endpoint(),
        }
    }
}

/// Image provider configuration.
///
/// The image backend shares credentials with [`RemoteConfig`]; only the
/// endpoint base may differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Overrides `remote.api_base` when set
    #[serde(default)]
    pub api_base: Option<String>,

    /// Requested output size
    #[serde(default = "default_image_size")]
    pub size: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            size: default_image_size(),
        }
    }
}

/// Content policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Banned substrings, checked in order; the first hit is reported
    #[serde(default = "default_banned_terms")]
    pub banned_terms: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            banned_terms: default_banned_terms(),
        }
    }
}

/// One alias table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub provider: ProviderKind,
    pub model: String,
}

impl RouteConfig {
    fn new(provider: ProviderKind, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
        }
    }
}

/// Alias table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Alias used when the request names none, or names an unknown one
    #[serde(default = "default_alias")]
    pub default_alias: String,

    /// Client alias -> (provider, model id)
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, RouteConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_alias: default_alias(),
            aliases: default_aliases(),
        }
    }
}

/// Permission flags for the storage endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    #[serde(default = "default_enabled")]
    pub fs_read: bool,
    #[serde(default = "default_enabled")]
    pub fs_write: bool,
    #[serde(default = "default_enabled")]
    pub session: bool,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            fs_read: true,
            fs_write: true,
            session: true,
        }
    }
}

/// Static asset and data directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory served for requests no API route matches
    #[serde(default = "default_document_root")]
    pub document_root: PathBuf,

    /// Sandbox for `/api/fs/*` and the session snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub permissions: PermissionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document_root: default_document_root(),
            data_dir: default_data_dir(),
            permissions: PermissionConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_enabled() -> bool {
    true
}

fn default_remote_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_system_prompt() -> String {
    "You are CodeX. Be precise, safe, and helpful.".to_string()
}

fn default_local_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_banned_terms() -> Vec<String> {
    [
        "nsfw", "sexual", "porn", "nude", "child", "minor", "illegal", "exploit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_alias() -> String {
    "fast".to_string()
}

fn default_aliases() -> HashMap<String, RouteConfig> {
    HashMap::from([
        (
            "fast".to_string(),
            RouteConfig::new(ProviderKind::RemoteText, "gpt-4o-mini"),
        ),
        (
            "smart".to_string(),
            RouteConfig::new(ProviderKind::RemoteText, "gpt-4o"),
        ),
        (
            "codex".to_string(),
            RouteConfig::new(ProviderKind::RemoteText, "gpt-4.1"),
        ),
        (
            "image".to_string(),
            RouteConfig::new(ProviderKind::Image, "gpt-image-1"),
        ),
        (
            "local".to_string(),
            RouteConfig::new(ProviderKind::LocalText, "codellama"),
        ),
    ])
}

fn default_document_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}`, `${VAR:-default}` and `${VAR:default}` are expanded before
    /// parsing, then environment overrides are applied.
    ///
    /// ```no_run
    /// use prompt_gateway::core::config::AppConfig;
    ///
    /// let config = AppConfig::load("gateway.yaml").expect("Failed to load config");
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let expanded = expand_env_vars(&content);

        let mut config: AppConfig = serde_yaml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config
    }

    /// Environment variables take precedence over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.remote.api_key = key;
        }

        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            self.remote.api_base = base;
        }

        if let Ok(endpoint) = std::env::var("LOCAL_LLM_URL") {
            self.local.endpoint = endpoint;
        }

        if let Ok(timeout_str) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                self.request_timeout_secs = Some(timeout);
            }
        }

        if let Ok(root) = std::env::var("DOCUMENT_ROOT") {
            self.storage.document_root = PathBuf::from(root);
        }

        if let Ok(dir) = std::env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Base URL for image generation calls.
    pub fn image_api_base(&self) -> &str {
        self.image
            .api_base
            .as_deref()
            .unwrap_or(&self.remote.api_base)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["']?\$\{([^}:]+)(?::?-?([^}]*))?\}["']?"#).expect("valid env var pattern")
    })
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string()
}
