//! Configuration management for StudyBuddy services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// LLM completion service configuration
    pub llm: LlmConfig,

    /// OCR service configuration
    pub ocr: OcrConfig,

    /// Web resource search service configuration
    pub search: SearchConfig,

    /// Weakness store (vector service) configuration
    pub weakness_store: WeaknessStoreConfig,

    /// Resources cache refresh configuration
    pub refresh: RefreshConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Allowed CORS origins ("*" for any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared secret the managed auth provider signs JWTs with
    pub jwt_secret: Option<String>,

    /// Expected JWT audience
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,

    /// Require bearer tokens on /api routes
    #[serde(default = "default_enabled")]
    pub require_auth: bool,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// OpenAI-compatible completion endpoint base
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    /// OCR service base URL
    #[serde(default = "default_ocr_api_base")]
    pub api_base: String,

    /// API key, if the OCR service requires one
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search service base URL
    #[serde(default = "default_search_api_base")]
    pub api_base: String,

    /// API key for the search service
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeaknessStoreConfig {
    /// Vector store service base URL
    #[serde(default = "default_weakness_api_base")]
    pub api_base: String,

    /// Collection holding per-user learning records
    #[serde(default = "default_weakness_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_weakness_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Seconds between resources-cache refresh sweeps
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,

    /// Maximum cache rows examined per sweep
    #[serde(default = "default_refresh_batch_limit")]
    pub batch_limit: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second across the /api surface
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_cors_origins() -> Vec<String> { vec!["*".to_string()] }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_audience() -> String { "authenticated".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_llm_api_base() -> String { "https://integrate.api.nvidia.com/v1".to_string() }
fn default_llm_model() -> String { "nvidia/nvidia-nemotron-nano-9b-v2".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_ocr_api_base() -> String { "http://localhost:8884".to_string() }
fn default_ocr_timeout() -> u64 { 60 }
fn default_search_api_base() -> String { "https://api.perplexity.ai".to_string() }
fn default_search_timeout() -> u64 { 30 }
fn default_weakness_api_base() -> String { "http://localhost:8001".to_string() }
fn default_weakness_collection() -> String { "user_learning_data".to_string() }
fn default_weakness_timeout() -> u64 { 10 }
fn default_refresh_interval() -> u64 { 3600 }
fn default_refresh_batch_limit() -> u64 { 50 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "studybuddy".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8001
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the cache refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
                max_upload_bytes: default_max_upload_bytes(),
                cors_origins: default_cors_origins(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/studybuddy".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                jwt_audience: default_jwt_audience(),
                require_auth: default_enabled(),
                request_id_header: default_request_id_header(),
            },
            llm: LlmConfig {
                api_base: default_llm_api_base(),
                api_key: None,
                model: default_llm_model(),
                timeout_secs: default_llm_timeout(),
            },
            ocr: OcrConfig {
                api_base: default_ocr_api_base(),
                api_key: None,
                timeout_secs: default_ocr_timeout(),
            },
            search: SearchConfig {
                api_base: default_search_api_base(),
                api_key: None,
                timeout_secs: default_search_timeout(),
            },
            weakness_store: WeaknessStoreConfig {
                api_base: default_weakness_api_base(),
                collection: default_weakness_collection(),
                timeout_secs: default_weakness_timeout(),
            },
            refresh: RefreshConfig {
                interval_secs: default_refresh_interval(),
                batch_limit: default_refresh_batch_limit(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}
