//! Configuration module for depthcrawl
//!
//! Settings are layered: defaults, then an optional TOML file, then
//! overrides from flags and `DEPTHCRAWL_*` environment variables.
//!
//! # Example
//!
//! ```no_run
//! use depthcrawl::config::{find_config_file, load_config, ConfigOverrides};
//!
//! let path = find_config_file(None);
//! let config = load_config(path.as_deref(), &ConfigOverrides::default()).unwrap();
//! println!("Crawler will use max depth: {}", config.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, HttpConfig, LogConfig, LogFormat, StoreConfig, VisitedBackend, VisitedConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, find_config_file, load_config, load_config_with_hash, parse_duration,
    ConfigOverrides, DEFAULT_CONFIG_PATHS,
};
pub use validation::{require_start_url, validate, MAX_WORKERS};
