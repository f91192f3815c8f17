use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = ".test-case-generator.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
}

/// Top-level configuration loaded from .test-case-generator.toml.
/// Every field is optional; environment variables fill in and override secrets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// The single origin allowed by CORS
    pub allowed_origin: String,
    /// Include upstream error detail in error responses
    pub development: bool,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            allowed_origin: "http://localhost:5173".to_string(),
            development: false,
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub api_base: String,
    pub oauth_base: String,
    /// Personal token used by the `generate` command. Falls back to GITHUB_TOKEN.
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            api_base: "https://api.github.com".to_string(),
            oauth_base: "https://github.com".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Prompts larger than this are rejected before calling the model
    pub max_prompt_bytes: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.7,
            max_output_tokens: 4000,
            max_prompt_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every outbound GitHub and model call
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Config {
    /// Load configuration from .test-case-generator.toml in the current directory,
    /// then apply environment overrides.
    /// Returns default config (plus environment) if the file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a specific path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Override settings from environment-style lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("GITHUB_CLIENT_ID") {
            self.github.client_id = Some(value);
        }
        if let Some(value) = get("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(value);
        }
        if let Some(value) = get("GITHUB_REDIRECT_URI") {
            self.github.redirect_uri = Some(value);
        }
        if self.github.token.is_none() {
            self.github.token = get("GITHUB_TOKEN");
        }
        if let Some(value) = get("GEMINI_API_KEY").or_else(|| get("API_KEY")) {
            self.ai.api_key = Some(value);
        }
        if let Some(value) = get("ALLOWED_ORIGIN") {
            self.server.allowed_origin = value;
        }
        if let Some(value) = get("BIND_ADDR") {
            self.server.bind = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BIND_ADDR",
                value,
            })?;
        }
        if let Some(value) = get("APP_ENV") {
            self.server.development = value.eq_ignore_ascii_case("development");
        }
        Ok(())
    }

    pub fn ai_api_key(&self) -> Result<&str, ConfigError> {
        self.ai.api_key.as_deref().ok_or(ConfigError::Missing("API_KEY"))
    }
}
