//! Configuration loading, validation, and management for toolrelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model ids listed by `GET /v1/models`
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Upstream service configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Context window configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Credential storage configuration
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_models() -> Vec<String> {
    [
        "claude-opus-4-5",
        "claude-sonnet-4-5",
        "claude-haiku-4-5",
        "gpt-5",
        "gpt-4o",
        "o3",
        "gemini-2.5-pro",
        "grok-4",
        "deepseek-chat",
        "mistral-large-latest",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Upper bound on request bodies; long histories get large
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8081
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_origin")]
    pub referer: String,

    /// Overall deadline for one upstream call, generous enough for long generations
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Used when a request names no model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used when probing whether a credential works
    #[serde(default = "default_probe_model")]
    pub probe_model: String,

    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Driver used when no prefix rule matches
    #[serde(default = "default_fallback_driver")]
    pub fallback_driver: String,

    /// Model prefix rules, first match wins
    #[serde(default = "default_drivers")]
    pub drivers: Vec<DriverRule>,
}

/// Maps every model id starting with `prefix` onto `driver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRule {
    pub prefix: String,
    pub driver: String,
}

impl DriverRule {
    pub fn new(prefix: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            driver: driver.into(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.puter.com/drivers/call".into()
}
fn default_origin() -> String {
    "https://docs.puter.com".into()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_model() -> String {
    "claude-opus-4-5".into()
}
fn default_probe_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_interface() -> String {
    "puter-chat-completion".into()
}
fn default_method() -> String {
    "complete".into()
}
fn default_fallback_driver() -> String {
    "openrouter".into()
}
fn default_drivers() -> Vec<DriverRule> {
    let mut rules = vec![
        DriverRule::new("openrouter:", "openrouter"),
        DriverRule::new("togetherai:", "together-ai"),
        DriverRule::new("claude-", "claude"),
        DriverRule::new("gpt-", "openai-completion"),
        DriverRule::new("o1", "openai-completion"),
        DriverRule::new("o3", "openai-completion"),
        DriverRule::new("o4", "openai-completion"),
        DriverRule::new("gemini-", "gemini"),
        DriverRule::new("grok-", "xai"),
        DriverRule::new("deepseek-", "deepseek"),
    ];
    for prefix in [
        "mistral-",
        "ministral-",
        "open-mistral-",
        "pixtral-",
        "codestral-",
        "devstral-",
        "magistral-",
    ] {
        rules.push(DriverRule::new(prefix, "mistral"));
    }
    rules
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            origin: default_origin(),
            referer: default_origin(),
            timeout_secs: default_timeout_secs(),
            default_model: default_model(),
            probe_model: default_probe_model(),
            interface: default_interface(),
            method: default_method(),
            fallback_driver: default_fallback_driver(),
            drivers: default_drivers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Character budget for the system prompt plus retained turns
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    700_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_credential_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.toolrelay/toolrelay.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_credential_backend() -> String {
    "sqlite".into()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: default_credential_backend(),
            db_path: None,
        }
    }
}

impl CredentialsConfig {
    /// The database path, falling back to the config directory.
    pub fn resolved_db_path(&self) -> String {
        match &self.db_path {
            Some(path) => path.clone(),
            None => AppConfig::config_dir()
                .join("toolrelay.db")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolrelay/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `TOOLRELAY_PORT`, then `PORT`
    /// - `TOOLRELAY_DB_PATH`, then `DB_PATH`
    /// - `TOOLRELAY_UPSTREAM`
    /// - `TOOLRELAY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = lookup("TOOLRELAY_PORT").or_else(|| lookup("PORT")) {
            self.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("invalid port: {port}")))?;
        }

        if let Some(path) = lookup("TOOLRELAY_DB_PATH").or_else(|| lookup("DB_PATH")) {
            self.credentials.db_path = Some(path);
        }

        if let Some(endpoint) = lookup("TOOLRELAY_UPSTREAM") {
            self.upstream.endpoint = endpoint;
        }

        if let Some(model) = lookup("TOOLRELAY_MODEL") {
            self.upstream.default_model = model;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be non-zero".into()));
        }

        if self.context.max_chars == 0 {
            return Err(ConfigError::ValidationError("context.max_chars must be > 0".into()));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "upstream.timeout_secs must be > 0".into(),
            ));
        }

        if let Some(rule) = self
            .upstream
            .drivers
            .iter()
            .find(|r| r.prefix.is_empty() || r.driver.is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "driver rule needs both prefix and driver (got prefix={:?}, driver={:?})",
                rule.prefix, rule.driver
            )));
        }

        match self.credentials.backend.as_str() {
            "sqlite" | "memory" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "unknown credentials.backend: {other}"
            ))),
        }
    }

    /// The socket address the gateway binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            gateway: GatewayConfig::default(),
            upstream: UpstreamConfig::default(),
            context: ContextConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
