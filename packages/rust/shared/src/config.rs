//! Application configuration for the Saturator server.
//!
//! Config lives in a TOML file passed via `--config`; CLI flags override
//! config file values, which override defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaturatorError};

// ---------------------------------------------------------------------------
// Config structs (matching saturator.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Batch scheduling and retry policy.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Profile fetching settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Proxy rotation settings.
    #[serde(default)]
    pub rotation: RotationSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory snapshot files are written to and served from.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Log file the server duplicates its output to.
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_dir: default_store_dir(),
            log_file: default_log_file(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_store_dir() -> String {
    "store".into()
}
fn default_log_file() -> String {
    "server.log".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Maximum accounts processed concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum fetch attempts per account before it is marked failed.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_limit: default_retry_limit(),
        }
    }
}

fn default_batch_size() -> usize {
    300
}
fn default_retry_limit() -> u32 {
    2
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Base URL public profile pages are fetched from.
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            profile_base_url: default_profile_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_profile_base_url() -> String {
    "https://t.me".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// `[rotation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSection {
    /// Seconds to wait before retrying a failed rotation request.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Seconds to wait after a successful rotation before the batch starts.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            settle_delay_secs: default_settle_delay_secs(),
        }
    }
}

fn default_retry_delay_secs() -> u64 {
    5
}
fn default_settle_delay_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config sections)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration handed to each enrichment run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum accounts per batch.
    pub batch_size: usize,
    /// Maximum fetch attempts per account.
    pub retry_limit: u32,
    /// Base URL for profile pages.
    pub profile_base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay before retrying a failed rotation request.
    pub rotate_retry_delay: Duration,
    /// Delay after a successful rotation.
    pub rotate_settle_delay: Duration,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size,
            retry_limit: config.pipeline.retry_limit,
            profile_base_url: config.fetch.profile_base_url.clone(),
            request_timeout: Duration::from_secs(config.fetch.request_timeout_secs),
            rotate_retry_delay: Duration::from_secs(config.rotation.retry_delay_secs),
            rotate_settle_delay: Duration::from_secs(config.rotation.settle_delay_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the application config. Returns defaults if no path is given or the
/// file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SaturatorError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SaturatorError::config(format!("failed to parse {}: {e}", path.display()))
    })
}
