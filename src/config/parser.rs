use crate::config::types::{Config, LogFormat, VisitedBackend};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Locations searched, in order, when no config file is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["./depthcrawl.toml", "./configs/depthcrawl.toml"];

/// Settings that take precedence over the config file
///
/// The binary fills these from command-line flags and `DEPTHCRAWL_*`
/// environment variables; unset fields leave the file's value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub start_url: Option<String>,
    pub same_host: Option<bool>,
    pub max_depth: Option<u32>,
    pub worker_count: Option<usize>,
    pub force_recrawl: Option<bool>,
    pub http_timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub store_path: Option<PathBuf>,
    pub visited_backend: Option<VisitedBackend>,
    pub visited_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub set_key: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    /// Writes every set override into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.start_url {
            config.start_url = Some(url.clone());
        }
        if let Some(same_host) = self.same_host {
            config.same_host = same_host;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(worker_count) = self.worker_count {
            config.worker_count = worker_count;
        }
        if let Some(force_recrawl) = self.force_recrawl {
            config.force_recrawl = force_recrawl;
        }
        if let Some(timeout) = self.http_timeout {
            config.http.timeout = timeout;
        }
        if let Some(user_agent) = &self.user_agent {
            config.http.user_agent = user_agent.clone();
        }
        if let Some(path) = &self.store_path {
            config.store.database_path = path.clone();
        }
        if let Some(backend) = self.visited_backend {
            config.visited.backend = backend;
        }
        if let Some(path) = &self.visited_path {
            config.visited.database_path = path.clone();
        }
        if let Some(redis_url) = &self.redis_url {
            config.visited.redis_url = redis_url.clone();
        }
        if let Some(set_key) = &self.set_key {
            config.visited.set_key = set_key.clone();
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
    }
}

/// Resolves which config file to read
///
/// An explicit path is returned as given, even if it does not exist, so that
/// reading it reports the error. Otherwise the first existing entry of
/// [`DEFAULT_CONFIG_PATHS`] is used; finding none is not an error.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

/// Loads the configuration from an optional file and applies overrides
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file; `None` starts from defaults
/// * `overrides` - Values from flags and environment, applied after the file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use depthcrawl::config::{load_config, ConfigOverrides};
/// use std::path::Path;
///
/// let config = load_config(Some(Path::new("depthcrawl.toml")), &ConfigOverrides::default()).unwrap();
/// println!("Max depth: {}", config.max_depth);
/// ```
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Config::default(),
    };

    overrides.apply(&mut config);
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the settings they used.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns it with the hash of its file, if any
pub fn load_config_with_hash(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(Config, Option<String>), ConfigError> {
    let config = load_config(path, overrides)?;
    let hash = path.map(compute_config_hash).transpose()?;
    Ok((config, hash))
}

/// Parses a duration such as `"500ms"`, `"30s"`, `"2m"` or `"1h"`
///
/// A bare number is read as seconds.
///
/// # Example
///
/// ```
/// use depthcrawl::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
/// ```
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let text = raw.trim();
    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };

    Ok(duration)
}
