//! Configuration management for the Classy sync job.
//!
//! Supports loading from environment variables (with `.env` support), a TOML
//! config file, and CLI overrides applied by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Classy API credentials and endpoints
    pub classy: ClassyConfig,

    /// HTTP request settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry and rate limiting configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Output and log file paths
    #[serde(default)]
    pub paths: PathConfig,

    /// Record filtering settings
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassyConfig {
    /// OAuth2 client id
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// Campaign whose transactions are exported
    pub campaign_id: String,

    /// Organization the campaign belongs to (informational)
    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for data requests (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for token requests (seconds)
    #[serde(default = "default_token_timeout_secs")]
    pub token_timeout_secs: u64,

    /// Related objects embedded in each transaction (`with` parameter)
    #[serde(default = "default_include")]
    pub include: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            token_timeout_secs: default_token_timeout_secs(),
            include: default_include(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries per page after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Delay before the first retry (seconds)
    #[serde(default = "default_initial_retry_delay_secs")]
    pub initial_retry_delay_secs: f64,

    /// Pause between successful page requests (seconds)
    #[serde(default = "default_rate_limit_delay_secs")]
    pub rate_limit_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            initial_retry_delay_secs: default_initial_retry_delay_secs(),
            rate_limit_delay_secs: default_rate_limit_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_retry_delay_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            log_file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Statuses (case-insensitive) dropped from the export
    #[serde(default = "default_excluded_statuses")]
    pub excluded_statuses: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_statuses: default_excluded_statuses(),
        }
    }
}

// Default value functions
fn default_token_url() -> String {
    "https://api.classy.org/oauth2/auth".to_string()
}

fn default_api_base_url() -> String {
    "https://api.classy.org/2.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120 // Large campaigns return slow pages
}

fn default_token_timeout_secs() -> u64 {
    30
}

fn default_include() -> Vec<String> {
    ["fundraising_team", "fundraising_page", "member"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_initial_retry_delay_secs() -> f64 {
    1.0
}

fn default_rate_limit_delay_secs() -> f64 {
    0.5
}

fn default_output_file() -> PathBuf {
    PathBuf::from("team-funds-export.json")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/classy_sync.log")
}

pub fn default_excluded_statuses() -> Vec<String> {
    vec!["canceled".to_string(), "incomplete".to_string()]
}

/// Read an environment variable, ignoring unset or empty values.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}

fn required_env(key: &str) -> anyhow::Result<String> {
    env_string(key).ok_or_else(|| anyhow::anyhow!("{} environment variable not set", key))
}

impl SyncConfig {
    /// Load configuration from the environment (and `.env`, if present)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self {
            classy: ClassyConfig {
                client_id: required_env("CLASSY_CLIENT_ID")?,
                client_secret: required_env("CLASSY_CLIENT_SECRET")?,
                campaign_id: required_env("CLASSY_CAMPAIGN_ID")?,
                organization_id: None,
                token_url: default_token_url(),
                api_base_url: default_api_base_url(),
            },
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            paths: PathConfig::default(),
            filter: FilterConfig::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        // Environment variables override file settings
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(::toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(v) = env_string("CLASSY_CLIENT_ID") {
            self.classy.client_id = v;
        }
        if let Some(v) = env_string("CLASSY_CLIENT_SECRET") {
            self.classy.client_secret = v;
        }
        if let Some(v) = env_string("CLASSY_CAMPAIGN_ID") {
            self.classy.campaign_id = v;
        }
        if let Some(v) = env_string("CLASSY_ORGANIZATION_ID") {
            self.classy.organization_id = Some(v);
        }
        if let Some(v) = env_string("CLASSY_TOKEN_URL") {
            self.classy.token_url = v;
        }
        if let Some(v) = env_string("CLASSY_API_BASE_URL") {
            self.classy.api_base_url = v;
        }
        if let Some(v) = env_string("OUTPUT_FILE_PATH") {
            self.paths.output_file = PathBuf::from(v);
        }
        if let Some(v) = env_string("LOG_FILE_PATH") {
            self.paths.log_file = PathBuf::from(v);
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT")? {
            self.http.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("MAX_RETRIES")? {
            self.retry.max_retries = v;
        }
        if let Some(v) = env_parse("RETRY_BACKOFF_FACTOR")? {
            self.retry.backoff_factor = v;
        }
        if let Some(v) = env_parse("INITIAL_RETRY_DELAY")? {
            self.retry.initial_retry_delay_secs = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_DELAY")? {
            self.retry.rate_limit_delay_secs = v;
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a working run
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.classy.client_id.trim().is_empty() {
            anyhow::bail!("classy.client_id must not be empty");
        }
        if self.classy.client_secret.trim().is_empty() {
            anyhow::bail!("classy.client_secret must not be empty");
        }
        if self.classy.campaign_id.trim().is_empty() {
            anyhow::bail!("classy.campaign_id must not be empty");
        }
        if self.http.request_timeout_secs == 0 || self.http.token_timeout_secs == 0 {
            anyhow::bail!("HTTP timeouts must be > 0");
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            anyhow::bail!("retry.backoff_factor must be >= 1");
        }
        for (name, value) in [
            ("retry.initial_retry_delay_secs", self.retry.initial_retry_delay_secs),
            ("retry.rate_limit_delay_secs", self.retry.rate_limit_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative number of seconds", name);
            }
        }
        Ok(())
    }

    /// Full URL of the campaign transactions collection
    pub fn transactions_url(&self) -> String {
        format!(
            "{}/campaigns/{}/transactions",
            self.classy.api_base_url.trim_end_matches('/'),
            self.classy.campaign_id
        )
    }
}
