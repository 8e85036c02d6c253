use thiserror::Error;

/// Top-level error type shared by netinv crates.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for InventoryError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
