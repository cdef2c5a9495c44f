use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use super::{ConfigError, LoggingConfig, env_parse, read_config_file};

/// Timers driving the session actor, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub reconcile_interval: u64,
    pub sweep_interval: u64,
    pub heartbeat_interval: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: 5,
            sweep_interval: 60,
            heartbeat_interval: 30,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn reconcile_every(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval)
    }

    #[must_use]
    pub const fn sweep_every(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    #[must_use]
    pub const fn heartbeat_every(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

/// Reconnect policy for the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub max_retries: u32,
    /// Delay before reconnecting after a channel error or unexpected close.
    pub error_delay: u64,
    /// Delay before reconnecting after a timeout.
    pub timeout_delay: u64,
    /// Bound on connecting plus receiving the `subscribed` acknowledgement.
    pub connect_timeout: u64,
    /// Silence, keep-alives included, after which a subscribed feed counts as
    /// timed out. The server pings every 15 seconds.
    pub idle_timeout: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            error_delay: 1,
            timeout_delay: 2,
            connect_timeout: 10,
            idle_timeout: 30,
        }
    }
}

impl SubscriptionConfig {
    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_delay)
    }

    #[must_use]
    pub const fn timeout_backoff(&self) -> Duration {
        Duration::from_secs(self.timeout_delay)
    }

    #[must_use]
    pub const fn connect_deadline(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub const fn idle_deadline(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

/// Remote cleanup cadence and retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Seconds between cleanup passes.
    pub interval: u64,
    /// Seconds of inactivity after which a non-operator identity is removed.
    pub user_retention: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: 60 * 60,
            user_retention: 7 * 24 * 60 * 60,
        }
    }
}

impl CleanupConfig {
    #[must_use]
    pub const fn every(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.user_retention)
    }
}

/// Configuration for the chat engine and the `chat`/`cleanup` commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: Url,
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
    pub subscription: SubscriptionConfig,
    pub cleanup: CleanupConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            logging: LoggingConfig::default(),
            sync: SyncConfig::default(),
            subscription: SubscriptionConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn default_server_url() -> Url {
    Url::parse("http://localhost:8080/").unwrap_or_else(|_| unreachable!("static URL parses"))
}

impl ClientConfig {
    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// environment variable holds an unparsable value, or validation fails.
    pub fn load_config(
        config_path: Option<PathBuf>,
        server_override: Option<Url>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => read_config_file(&path)?,
            None => Self::default(),
        };

        config.apply_env()?;

        if let Some(url) = server_override {
            config.server_url = url;
        }

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::default();

        if self.server_url == defaults.server_url
            && let Some(url) = env_parse::<Url>("EPHEMERA_SERVER_URL")?
        {
            self.server_url = url;
        }
        if self.sync.reconcile_interval == defaults.sync.reconcile_interval
            && let Some(secs) = env_parse("EPHEMERA_RECONCILE_INTERVAL")?
        {
            self.sync.reconcile_interval = secs;
        }
        if self.subscription.max_retries == defaults.subscription.max_retries
            && let Some(retries) = env_parse("EPHEMERA_MAX_RETRIES")?
        {
            self.subscription.max_retries = retries;
        }
        if self.cleanup.interval == defaults.cleanup.interval
            && let Some(secs) = env_parse("EPHEMERA_CLEANUP_INTERVAL")?
        {
            self.cleanup.interval = secs;
        }

        self.logging.apply_env()
    }

    /// Collects every problem with the configuration.
    ///
    /// # Errors
    /// Returns the list of problems when at least one is found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(self.server_url.scheme(), "http" | "https") {
            errors.push(format!(
                "Server URL must use http or https: {}",
                self.server_url
            ));
        }

        for (name, value) in [
            ("sync.reconcile_interval", self.sync.reconcile_interval),
            ("sync.sweep_interval", self.sync.sweep_interval),
            ("sync.heartbeat_interval", self.sync.heartbeat_interval),
            ("subscription.connect_timeout", self.subscription.connect_timeout),
            ("subscription.idle_timeout", self.subscription.idle_timeout),
            ("cleanup.interval", self.cleanup.interval),
            ("cleanup.user_retention", self.cleanup.user_retention),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0 seconds."));
            }
        }
        self.logging.validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            std::env::remove_var("EPHEMERA_SERVER_URL");
            std::env::remove_var("EPHEMERA_RECONCILE_INTERVAL");
            std::env::remove_var("EPHEMERA_MAX_RETRIES");
            std::env::remove_var("EPHEMERA_CLEANUP_INTERVAL");
            std::env::remove_var("EPHEMERA_LOG_LEVEL");
            std::env::remove_var("EPHEMERA_LOG_FORMAT");
        }
    }

    #[test]
    #[serial]
    fn test_defaults_match_engine_timers() {
        cleanup_env_vars();
        let config = ClientConfig::load_config(None, None).unwrap();

        assert_eq!(config.server_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.sync.reconcile_every(), Duration::from_secs(5));
        assert_eq!(config.sync.sweep_every(), Duration::from_secs(60));
        assert_eq!(config.sync.heartbeat_every(), Duration::from_secs(30));
        assert_eq!(config.subscription.max_retries, 3);
        assert_eq!(config.subscription.error_backoff(), Duration::from_secs(1));
        assert_eq!(config.subscription.timeout_backoff(), Duration::from_secs(2));
        assert_eq!(config.subscription.idle_deadline(), Duration::from_secs(30));
        assert_eq!(config.cleanup.every(), Duration::from_secs(3600));
        assert_eq!(config.cleanup.retention(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    #[serial]
    fn test_environment_fills_defaults() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("EPHEMERA_SERVER_URL", "https://chat.example.com/");
            std::env::set_var("EPHEMERA_MAX_RETRIES", "5");
        }

        let config = ClientConfig::load_config(None, None).unwrap();
        assert_eq!(config.server_url.as_str(), "https://chat.example.com/");
        assert_eq!(config.subscription.max_retries, 5);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_server_override_wins() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("EPHEMERA_SERVER_URL", "https://chat.example.com/");
        }

        let url = Url::parse("http://127.0.0.1:9000/").unwrap();
        let config = ClientConfig::load_config(None, Some(url.clone())).unwrap();
        assert_eq!(config.server_url, url);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_retry_environment() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("EPHEMERA_MAX_RETRIES", "many");
        }

        let err = ClientConfig::load_config(None, None).unwrap_err();
        assert!(err.to_string().contains("Invalid EPHEMERA_MAX_RETRIES"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_partial_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let config_file = temp_dir.path().join("client.yml");
        fs::write(
            &config_file,
            r#"
server_url: "http://chat.internal:8080/"
sync:
  reconcile_interval: 10
subscription:
  max_retries: 1
"#,
        )?;

        let config = ClientConfig::load_config(Some(config_file), None)?;
        assert_eq!(config.server_url.host_str(), Some("chat.internal"));
        assert_eq!(config.sync.reconcile_interval, 10);
        assert_eq!(config.sync.sweep_interval, 60);
        assert_eq!(config.subscription.max_retries, 1);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_intervals_and_bad_scheme() {
        let config = ClientConfig {
            server_url: Url::parse("ftp://files.example.com/").unwrap(),
            sync: SyncConfig {
                reconcile_interval: 0,
                ..SyncConfig::default()
            },
            ..ClientConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("sync.reconcile_interval")));
    }
}
