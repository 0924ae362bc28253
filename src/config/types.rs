use crate::config::parser::parse_duration;
use crate::crawler::DEFAULT_USER_AGENT;
use crate::ConfigError;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for depthcrawl
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Seed URL; required, but may come from the environment or a flag
    pub start_url: Option<String>,

    /// Only follow links to the seed's host
    pub same_host: bool,

    /// Descent cap; the seed is depth 0
    pub max_depth: u32,

    /// Number of concurrent workers
    pub worker_count: usize,

    /// Clear the visited set before crawling
    pub force_recrawl: bool,

    pub http: HttpConfig,
    pub store: StoreConfig,
    pub visited: VisitedConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_url: None,
            same_host: true,
            max_depth: 2,
            worker_count: 10,
            force_recrawl: false,
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            visited: VisitedConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout, covering connect, headers and body
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the SQLite database holding crawled pages
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./depthcrawl.db"),
        }
    }
}

/// Where the visited set lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitedBackend {
    Sqlite,
    Redis,
}

impl fmt::Display for VisitedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for VisitedBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::Validation(format!(
                "unknown visited backend '{}' (expected sqlite or redis)",
                other
            ))),
        }
    }
}

/// Visited set configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct VisitedConfig {
    pub backend: VisitedBackend,

    /// SQLite database used by the `sqlite` backend; may be the record store's file
    pub database_path: PathBuf,

    /// Connection URL used by the `redis` backend
    pub redis_url: String,

    /// Name of the set holding visited URLs
    pub set_key: String,
}

impl Default for VisitedConfig {
    fn default() -> Self {
        Self {
            backend: VisitedBackend::Sqlite,
            database_path: PathBuf::from("./depthcrawl.db"),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            set_key: "crawler:visited_urls".to_string(),
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unknown log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Accepts either a bare number of seconds or a string such as `"30s"`
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
