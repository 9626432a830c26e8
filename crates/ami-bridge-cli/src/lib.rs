//! AMI Bridge CLI library
//!
//! Configuration loading, command line parsing and the session wiring used by the
//! `ami-bridge` binary.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::{run_session, BridgeApp};
pub use cli::Cli;
pub use config::{AppConfig, ConfigError, ConfigOverrides, PublisherKind};
pub use error::{CliError, Result};
