//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigOverrides, PublisherKind};

/// Bridge Asterisk manager interface events into a console or AMQP publisher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension) replacing ami-bridge.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Publisher to hand events to, overriding PUBLISHER
    #[arg(short, long, value_enum)]
    pub publisher: Option<PublisherKind>,

    /// Append every event to the fallback log, overriding LOG_EVENTS
    #[arg(long)]
    pub log_events: bool,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            publisher: self.publisher,
            log_events: self.log_events.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "ami-bridge",
            "--config",
            "/etc/ami-bridge.toml",
            "-v",
            "--publisher",
            "amqp",
            "--log-events",
        ]);
        assert!(cli.verbose);
        assert!(!cli.json_logs);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ami-bridge.toml")));

        let overrides = cli.overrides();
        assert_eq!(overrides.publisher, Some(PublisherKind::Amqp));
        assert_eq!(overrides.log_events, Some(true));
    }

    #[test]
    fn test_no_flags_means_no_overrides() {
        let cli = Cli::parse_from(["ami-bridge"]);
        let overrides = cli.overrides();
        assert!(overrides.publisher.is_none());
        assert!(overrides.log_events.is_none());
    }
}
