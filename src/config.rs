use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CleanerError, Result};
use crate::rate_limiter;

/// Registered client id of the tag cleaner application
pub const DEFAULT_CLIENT_ID: &str = "642d85afcadd2b30e6dff9a5";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_redirect_host")]
    pub redirect_host: String,
    /// Must match the redirect URI registered for the client id
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Unset means wait for the redirect indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_timeout_secs: Option<u64>,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            redirect_host: default_redirect_host(),
            redirect_port: default_redirect_port(),
            redirect_path: default_redirect_path(),
            poll_interval_secs: default_poll_interval_secs(),
            redirect_timeout_secs: None,
            open_browser: default_open_browser(),
        }
    }
}

impl OAuthConfig {
    /// Redirect URI for the configured port
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri_for_port(self.redirect_port)
    }

    /// Redirect URI for the port the listener actually bound
    pub fn redirect_uri_for_port(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.redirect_host, port, self.redirect_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn redirect_timeout(&self) -> Option<Duration> {
        self.redirect_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

impl DeletionConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_authorize_url() -> String {
    "https://raindrop.io/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://raindrop.io/oauth/access_token".to_string()
}

fn default_redirect_host() -> String {
    "localhost".to_string()
}

fn default_redirect_port() -> u16 {
    12705
}

fn default_redirect_path() -> String {
    "/oauth".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_open_browser() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.raindrop.io/rest/v1".to_string()
}

fn default_delay_ms() -> u64 {
    rate_limiter::DEFAULT_DELETE_DELAY.as_millis() as u64
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CleanerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CleanerError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(CleanerError::ConfigError(
                "oauth.client_id cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("oauth.authorize_url", &self.oauth.authorize_url),
            ("oauth.token_url", &self.oauth.token_url),
            ("api.base_url", &self.api.base_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                CleanerError::ConfigError(format!(
                    "{} is not a valid URL ('{}'): {}",
                    name, value, e
                ))
            })?;
        }

        if self.oauth.redirect_host.trim().is_empty() {
            return Err(CleanerError::ConfigError(
                "oauth.redirect_host cannot be empty".to_string(),
            ));
        }

        if !self.oauth.redirect_path.starts_with('/') {
            return Err(CleanerError::ConfigError(
                "oauth.redirect_path must start with '/'".to_string(),
            ));
        }

        if self.oauth.poll_interval_secs == 0 {
            return Err(CleanerError::ConfigError(
                "oauth.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.oauth.redirect_timeout_secs == Some(0) {
            return Err(CleanerError::ConfigError(
                "oauth.redirect_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        let min_delay_ms = rate_limiter::min_delay().as_millis() as u64;
        if self.deletion.delay_ms < min_delay_ms {
            return Err(CleanerError::ConfigError(format!(
                "deletion.delay_ms must be at least {} (Raindrop allows {} requests per minute)",
                min_delay_ms,
                rate_limiter::MAX_REQUESTS_PER_MINUTE
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
