//! AMI Bridge Configuration Management
//!
//! Configuration is a flat set of keys named after the environment variables that
//! traditionally drive the bridge (`AMI_HOST`, `HOST_DEVICE_ID`, ...). It is layered
//! with figment, lowest priority first:
//! - built-in defaults
//! - `ami-bridge.toml` in the working directory (or the file given with `--config`)
//! - `config.json` in the working directory
//! - process environment
//! - command line overrides
//!
//! When no password is configured, the secret is read from the `[<user>]` section of
//! the switch's `manager.conf`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ami_bridge_core::{BrokerConfig, SessionConfig, DEFAULT_AMI_PORT};
use figment::providers::{Env, Format, Json, Serialized, Toml};
use figment::value::{Dict, Map};
use figment::{Figment, Metadata, Profile, Provider};
use ini::Ini;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ami-bridge.toml";

/// JSON configuration file looked up in the working directory
pub const JSON_CONFIG_FILE: &str = "config.json";

/// Environment variables read into the configuration
pub const ENV_KEYS: &[&str] = &[
    "AMI_HOST",
    "AMI_PORT",
    "AMI_USER",
    "AMI_PASS",
    "AMI_CONF_PATH",
    "HOST_DEVICE_ID",
    "DIAL_TIMEOUT",
    "READ_TIMEOUT",
    "DIAL_RETRY",
    "NUMBER_OF_WORKERS",
    "NUMBER_OF_JOBS",
    "EXCLUDED_EVENTS",
    "PUBLISHER",
    "AMQP_URL",
    "AMQP_XCH_NAME",
    "AMQP_XCH_TYPE",
    "LOG_EVENTS",
    "EVENT_LOG_DIR",
];

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Which publisher receives events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    /// JSON lines on stdout
    Console,
    /// AMQP exchange with a local fallback log
    Amqp,
}

impl fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherKind::Console => write!(f, "console"),
            PublisherKind::Amqp => write!(f, "amqp"),
        }
    }
}

/// Complete configuration for the bridge binary
///
/// Field names are the lowercased environment variable names. Keys in configuration
/// files are matched case-insensitively, so `AMI_HOST` and `ami_host` are the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(deserialize_with = "lenient_string")]
    pub ami_host: String,

    pub ami_port: u16,

    #[serde(deserialize_with = "lenient_string")]
    pub ami_user: String,

    /// Login secret; empty means "look it up in manager.conf"
    #[serde(deserialize_with = "lenient_string")]
    pub ami_pass: String,

    pub ami_conf_path: PathBuf,

    #[serde(deserialize_with = "lenient_string")]
    pub host_device_id: String,

    /// Seconds; zero disables the dial timeout
    pub dial_timeout: u64,

    /// Seconds
    pub read_timeout: u64,

    pub dial_retry: u32,

    pub number_of_workers: usize,

    /// Event queue capacity
    pub number_of_jobs: usize,

    /// Comma-separated event names
    #[serde(deserialize_with = "lenient_string")]
    pub excluded_events: String,

    pub publisher: PublisherKind,

    pub amqp_url: String,

    pub amqp_xch_name: String,

    pub amqp_xch_type: String,

    pub log_events: bool,

    pub event_log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let broker = BrokerConfig::default();
        Self {
            ami_host: String::new(),
            ami_port: DEFAULT_AMI_PORT,
            ami_user: "admin".to_string(),
            ami_pass: String::new(),
            ami_conf_path: PathBuf::from("/etc/asterisk/manager.conf"),
            host_device_id: String::new(),
            dial_timeout: 0,
            read_timeout: 10,
            dial_retry: 3,
            number_of_workers: 50,
            number_of_jobs: 60,
            excluded_events: String::new(),
            publisher: PublisherKind::Console,
            amqp_url: broker.url,
            amqp_xch_name: broker.exchange_name,
            amqp_xch_type: broker.exchange_type,
            log_events: broker.log_all_events,
            event_log_dir: broker.fallback_dir,
        }
    }
}

/// Values supplied on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub publisher: Option<PublisherKind>,
    pub log_events: Option<bool>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load with the standard priority order and no command line overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(None, &ConfigOverrides::default())
    }

    /// Load configuration, replacing `ami-bridge.toml` with `config_file` when given
    pub fn load_with_overrides(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Self::figment(config_file);

        if let Some(publisher) = overrides.publisher {
            figment = figment.merge(("publisher", publisher));
        }
        if let Some(log_events) = overrides.log_events {
            figment = figment.merge(("log_events", log_events));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Every provider below the command line, lowest priority first
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let figment = match config_file {
            Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
                figment.merge(LowercaseKeys(Json::file(path)))
            }
            Some(path) => figment.merge(LowercaseKeys(Toml::file(path))),
            None => figment.merge(LowercaseKeys(Toml::file(DEFAULT_CONFIG_FILE))),
        };

        figment
            .merge(LowercaseKeys(Json::file(JSON_CONFIG_FILE)))
            .merge(Env::raw().only(ENV_KEYS))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ami_host.trim().is_empty() {
            return Err(ConfigError::Validation("AMI_HOST is not set".to_string()));
        }
        if self.host_device_id.trim().is_empty() {
            return Err(ConfigError::Validation("HOST_DEVICE_ID is not set".to_string()));
        }
        if self.ami_port == 0 {
            return Err(ConfigError::Validation("AMI_PORT must be greater than 0".to_string()));
        }
        if self.read_timeout == 0 {
            return Err(ConfigError::Validation(
                "READ_TIMEOUT must be greater than 0".to_string(),
            ));
        }
        if self.number_of_workers == 0 {
            return Err(ConfigError::Validation(
                "NUMBER_OF_WORKERS must be greater than 0".to_string(),
            ));
        }
        if self.number_of_jobs < self.number_of_workers {
            return Err(ConfigError::Validation(format!(
                "NUMBER_OF_JOBS ({}) must be greater than or equal to NUMBER_OF_WORKERS ({})",
                self.number_of_jobs, self.number_of_workers
            )));
        }
        Ok(())
    }

    /// Event names parsed from the comma-separated `excluded_events`
    pub fn excluded_event_names(&self) -> Vec<String> {
        self.excluded_events
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The configured password, or the user's secret from `manager.conf`
    pub fn resolve_secret(&self) -> Result<String, ConfigError> {
        if !self.ami_pass.is_empty() {
            return Ok(self.ami_pass.clone());
        }

        let manager_conf = Ini::load_from_file(&self.ami_conf_path).map_err(|e| {
            ConfigError::Loading(format!(
                "Failed to read {}: {}",
                self.ami_conf_path.display(),
                e
            ))
        })?;

        match manager_conf.get_from(Some(self.ami_user.as_str()), "secret") {
            Some(secret) => Ok(secret.trim().to_string()),
            None => {
                warn!(
                    "No secret for user {} in {}",
                    self.ami_user,
                    self.ami_conf_path.display()
                );
                Ok(String::new())
            }
        }
    }

    /// Build the session configuration, resolving the secret
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        let secret = self.resolve_secret()?;

        let broker = BrokerConfig {
            url: self.amqp_url.clone(),
            exchange_name: self.amqp_xch_name.clone(),
            exchange_type: self.amqp_xch_type.clone(),
            log_all_events: self.log_events,
            fallback_dir: self.event_log_dir.clone(),
        };

        Ok(
            SessionConfig::new(&self.ami_host, self.ami_port, &self.host_device_id)
                .with_credentials(&self.ami_user, secret)
                .with_dial(Duration::from_secs(self.dial_timeout), self.dial_retry)
                .with_read_timeout(Duration::from_secs(self.read_timeout))
                .with_workers(self.number_of_workers, self.number_of_jobs)
                .with_excluded_events(self.excluded_event_names())
                .with_broker(broker),
        )
    }

    /// Log the effective configuration, without the secret
    pub fn log_summary(&self) {
        info!(
            "Loaded configuration: AMI {}:{} as {}, host device id {}, publisher {}",
            self.ami_host, self.ami_port, self.ami_user, self.host_device_id, self.publisher
        );
        info!(
            "Dial timeout {}s, retries {}, read timeout {}s, {} workers, queue capacity {}",
            self.dial_timeout,
            self.dial_retry,
            self.read_timeout,
            self.number_of_workers,
            self.number_of_jobs
        );
        let excluded = self.excluded_event_names();
        if !excluded.is_empty() {
            info!("Excluded events: {}", excluded.join(", "));
        }
    }
}

/// Provider adapter lowercasing top-level keys, matching how environment keys arrive
struct LowercaseKeys<P>(P);

impl<P: Provider> Provider for LowercaseKeys<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Ok(self
            .0
            .data()?
            .into_iter()
            .map(|(profile, dict)| {
                let dict = dict
                    .into_iter()
                    .map(|(key, value)| (key.to_ascii_lowercase(), value))
                    .collect();
                (profile, dict)
            })
            .collect())
    }
}

/// Environment values that look numeric arrive as numbers; device ids and secrets
/// still need them as text
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Bool(b) => b.to_string(),
    })
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn create_test_config() -> AppConfig {
        AppConfig {
            ami_host: "10.0.0.5".to_string(),
            host_device_id: "pbx-1".to_string(),
            ami_pass: "s3cret".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert_eq!(config.ami_port, 5038);
        assert_eq!(config.ami_user, "admin");
        assert_eq!(config.read_timeout, 10);
        assert_eq!(config.dial_retry, 3);
        assert_eq!(config.number_of_workers, 50);
        assert_eq!(config.number_of_jobs, 60);
        assert_eq!(config.publisher, PublisherKind::Console);
        assert_eq!(config.amqp_xch_name, "amq.direct");
        assert!(!config.log_events);
    }

    #[test]
    fn test_config_validation() {
        assert!(create_test_config().validate().is_ok());

        // Required keys
        assert!(AppConfig::default().validate().is_err());
        let mut invalid = create_test_config();
        invalid.host_device_id = String::new();
        assert!(invalid.validate().is_err());

        // Queue smaller than the worker pool
        let mut invalid = create_test_config();
        invalid.number_of_workers = 10;
        invalid.number_of_jobs = 5;
        let err = invalid.validate().unwrap_err();
        assert!(err.to_string().contains("NUMBER_OF_JOBS"));

        let mut invalid = create_test_config();
        invalid.read_timeout = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_excluded_event_parsing() {
        let mut config = create_test_config();
        config.excluded_events = " VarSet, RTCPSent,,Newexten ".to_string();
        assert_eq!(
            config.excluded_event_names(),
            vec!["VarSet", "RTCPSent", "Newexten"]
        );

        config.excluded_events = String::new();
        assert!(config.excluded_event_names().is_empty());
    }

    #[test]
    fn test_session_config_conversion() {
        let mut config = create_test_config();
        config.dial_timeout = 5;
        config.number_of_workers = 4;
        config.number_of_jobs = 8;
        config.excluded_events = "VarSet".to_string();
        config.log_events = true;

        let session = config.to_session_config().unwrap();
        assert_eq!(session.address(), "10.0.0.5:5038");
        assert_eq!(session.secret, "s3cret");
        assert_eq!(session.dial_timeout, Duration::from_secs(5));
        assert_eq!(session.read_timeout, Duration::from_secs(10));
        assert_eq!(session.worker_count, 4);
        assert_eq!(session.queue_capacity, 8);
        assert!(session.is_excluded("VarSet"));
        assert!(session.broker.log_all_events);
        assert_eq!(session.broker.exchange_name, "amq.direct");
    }

    #[test]
    fn test_environment_layering() {
        Jail::expect_with(|jail| {
            jail.set_env("AMI_HOST", "pbx.example.net");
            jail.set_env("AMI_PASS", "envpass");
            jail.set_env("HOST_DEVICE_ID", "12345");
            jail.set_env("NUMBER_OF_WORKERS", "4");
            jail.set_env("NUMBER_OF_JOBS", "8");
            jail.set_env("EXCLUDED_EVENTS", "VarSet,RTCPSent");
            jail.set_env("LOG_EVENTS", "true");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.ami_host, "pbx.example.net");
            assert_eq!(config.host_device_id, "12345");
            assert_eq!(config.number_of_workers, 4);
            assert_eq!(config.number_of_jobs, 8);
            assert_eq!(config.excluded_event_names(), vec!["VarSet", "RTCPSent"]);
            assert!(config.log_events);
            assert_eq!(config.ami_port, 5038);
            Ok(())
        });
    }

    #[test]
    fn test_files_and_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                ami_host = "toml-host"
                host_device_id = "toml-device"
                ami_pass = "tomlpass"
                dial_retry = 7
                "#,
            )?;
            jail.create_file(
                JSON_CONFIG_FILE,
                r#"{ "AMI_HOST": "json-host", "READ_TIMEOUT": 30 }"#,
            )?;
            jail.set_env("AMI_HOST", "env-host");

            let overrides = ConfigOverrides {
                publisher: Some(PublisherKind::Amqp),
                log_events: Some(true),
            };
            let config = AppConfig::load_with_overrides(None, &overrides)
                .map_err(|e| e.to_string())?;

            assert_eq!(config.ami_host, "env-host");
            assert_eq!(config.host_device_id, "toml-device");
            assert_eq!(config.dial_retry, 7);
            assert_eq!(config.read_timeout, 30);
            assert_eq!(config.publisher, PublisherKind::Amqp);
            assert!(config.log_events);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_config_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.json",
                r#"{ "ami_host": "10.1.1.1", "host_device_id": "edge-9", "ami_pass": "x", "publisher": "amqp" }"#,
            )?;

            let config =
                AppConfig::load_with_overrides(Some(Path::new("bridge.json")), &ConfigOverrides::default())
                    .map_err(|e| e.to_string())?;
            assert_eq!(config.ami_host, "10.1.1.1");
            assert_eq!(config.publisher, PublisherKind::Amqp);
            Ok(())
        });
    }

    #[test]
    fn test_missing_required_keys_fail_loading() {
        Jail::expect_with(|jail| {
            jail.set_env("AMI_HOST", "pbx");
            let err = AppConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
            assert!(err.to_string().contains("HOST_DEVICE_ID"));
            Ok(())
        });
    }

    #[test]
    fn test_secret_from_manager_conf() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "manager.conf",
                "[general]\nenabled = yes\nport = 5038\n\n; bridge account\n[bridge]\nsecret = fromfile\nread = all\n",
            )?;

            let mut config = create_test_config();
            config.ami_pass = String::new();
            config.ami_user = "bridge".to_string();
            config.ami_conf_path = PathBuf::from("manager.conf");
            assert_eq!(config.resolve_secret().map_err(|e| e.to_string())?, "fromfile");

            config.ami_user = "nobody".to_string();
            assert_eq!(config.resolve_secret().map_err(|e| e.to_string())?, "");

            config.ami_conf_path = PathBuf::from("missing.conf");
            assert!(config.resolve_secret().is_err());
            Ok(())
        });
    }
}
