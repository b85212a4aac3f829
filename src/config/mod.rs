//! Mock portal configuration
//!
//! [`MockParams`] is built once, from defaults, an optional TOML file and
//! command-line overrides, then shared by reference with every component.

mod load;
mod params;

pub use load::{parse_override, ConfigOrigin, ConfigSource, LoadedParams};
pub use params::{MockParams, DEFAULT_DELAY_MS, DEFAULT_VERSION, KNOWN_KEYS};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
