use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Memory budget for keys and values (default: 128 MiB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// How long cached results may be served (default: 24h)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Where the CLI persists the cache between runs
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_age_secs: default_max_age_secs(),
            persist_path: None,
        }
    }
}

fn default_max_bytes() -> usize {
    128 * 1024 * 1024
}

fn default_max_age_secs() -> u64 {
    24 * 60 * 60
}

/// Aggregator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorSettings {
    /// How long to wait for the slow source once the fast ones are done
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Extra attempts for sources that support retrying
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            retries: default_retries(),
        }
    }
}

fn default_grace_period_ms() -> u64 {
    1000
}

fn default_retries() -> u32 {
    1
}

/// Torrent source configuration
///
/// Both sources are enabled unless their section sets `enabled = false`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Per-request HTTP timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub yts: YtsConfig,
    #[serde(default)]
    pub ibit: IbitConfig,
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            yts: YtsConfig::default(),
            ibit: IbitConfig::default(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

/// YTS API source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YtsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL, may be a proxy
    #[serde(default = "default_yts_url")]
    pub base_url: String,
}

impl Default for YtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_yts_url(),
        }
    }
}

fn default_yts_url() -> String {
    "https://yts.mx".to_string()
}

/// ibit scraping source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IbitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Site base URL, may be a proxy
    #[serde(default = "default_ibit_url")]
    pub base_url: String,
    /// Pause before each torrent page request (default: 150ms)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for IbitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_ibit_url(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

fn default_ibit_url() -> String {
    "https://ibit.am".to_string()
}

fn default_page_delay_ms() -> u64 {
    150
}

fn default_true() -> bool {
    true
}
