//! Error handling for the bridge binary

use thiserror::Error;

use ami_bridge_runtime::SessionError;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
