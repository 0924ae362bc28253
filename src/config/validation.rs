use crate::config::types::{Config, HttpConfig, LogConfig, VisitedBackend, VisitedConfig};
use crate::url::parse_seed;
use crate::ConfigError;
use url::Url;

/// Largest accepted worker pool
pub const MAX_WORKERS: usize = 1024;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validates the entire configuration
///
/// A missing start URL is not an error here because `--stats` runs without
/// one; [`require_start_url`] enforces it for crawling.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if let Some(start_url) = &config.start_url {
        validate_start_url(start_url)?;
    }

    if config.worker_count < 1 || config.worker_count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and {}, got {}",
            MAX_WORKERS, config.worker_count
        )));
    }

    validate_http_config(&config.http)?;

    if config.store.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "store.database-path cannot be empty".to_string(),
        ));
    }

    validate_visited_config(&config.visited)?;
    validate_log_config(&config.log)?;
    Ok(())
}

/// Returns the configured start URL, or an error if none was given
pub fn require_start_url(config: &Config) -> Result<&str, ConfigError> {
    config
        .start_url
        .as_deref()
        .ok_or(ConfigError::Missing("start-url"))
}

fn validate_start_url(start_url: &str) -> Result<(), ConfigError> {
    parse_seed(start_url)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start-url '{}': {}", start_url, e)))
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "http.timeout must be greater than zero".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "http.user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_visited_config(config: &VisitedConfig) -> Result<(), ConfigError> {
    if config.set_key.is_empty() {
        return Err(ConfigError::Validation(
            "visited.set-key cannot be empty".to_string(),
        ));
    }

    match config.backend {
        VisitedBackend::Sqlite => {
            if config.database_path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "visited.database-path cannot be empty".to_string(),
                ));
            }
        }
        VisitedBackend::Redis => {
            let url = Url::parse(&config.redis_url).map_err(|e| {
                ConfigError::InvalidUrl(format!(
                    "Invalid visited.redis-url '{}': {}",
                    config.redis_url, e
                ))
            })?;

            if !matches!(url.scheme(), "redis" | "rediss" | "unix" | "redis+unix") {
                return Err(ConfigError::InvalidUrl(format!(
                    "visited.redis-url must use a redis:// or rediss:// scheme, got '{}'",
                    config.redis_url
                )));
            }
        }
    }

    Ok(())
}

fn validate_log_config(config: &LogConfig) -> Result<(), ConfigError> {
    let level = config.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "log.level must be one of {}, got '{}'",
            LOG_LEVELS.join(", "),
            config.level
        )));
    }
    Ok(())
}
