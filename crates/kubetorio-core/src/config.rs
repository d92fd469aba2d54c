use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::BackoffPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches every namespace.
    pub namespace: Option<String>,
    pub field_manager: String,
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
    pub stale_requeue: Duration,
    /// Server-side watch timeout. Must stay below the client read timeout (30s).
    pub watch_timeout_secs: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            field_manager: "kubetorio".to_string(),
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(300),
            stale_requeue: Duration::from_secs(2),
            watch_timeout_secs: 25,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WATCH_NAMESPACE") {
            if !val.trim().is_empty() {
                config.namespace = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = std::env::var("FIELD_MANAGER") {
            config.field_manager = val;
        }

        if let Ok(val) = std::env::var("ERROR_BACKOFF_BASE_SECS") {
            config.error_backoff_base = parse_secs("ERROR_BACKOFF_BASE_SECS", &val)?;
        }

        if let Ok(val) = std::env::var("ERROR_BACKOFF_MAX_SECS") {
            config.error_backoff_max = parse_secs("ERROR_BACKOFF_MAX_SECS", &val)?;
        }

        if let Ok(val) = std::env::var("STALE_REQUEUE_SECS") {
            config.stale_requeue = parse_secs("STALE_REQUEUE_SECS", &val)?;
        }

        if let Ok(val) = std::env::var("WATCH_TIMEOUT_SECS") {
            config.watch_timeout_secs = val
                .parse()
                .map_err(|_| Error::InvalidConfig("Invalid WATCH_TIMEOUT_SECS".to_string()))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.error_backoff_base.is_zero() {
            return Err(Error::InvalidConfig(
                "ERROR_BACKOFF_BASE_SECS must be positive".to_string(),
            ));
        }
        if self.error_backoff_max < self.error_backoff_base {
            return Err(Error::InvalidConfig(
                "ERROR_BACKOFF_MAX_SECS must not be below ERROR_BACKOFF_BASE_SECS".to_string(),
            ));
        }
        if self.watch_timeout_secs == 0 || self.watch_timeout_secs >= 30 {
            return Err(Error::InvalidConfig(
                "WATCH_TIMEOUT_SECS must be between 1 and 29".to_string(),
            ));
        }
        if self.field_manager.is_empty() {
            return Err(Error::InvalidConfig("FIELD_MANAGER must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.error_backoff_base,
            max: self.error_backoff_max,
        }
    }
}

fn parse_secs(var: &str, val: &str) -> Result<Duration> {
    val.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| Error::InvalidConfig(format!("Invalid {}", var)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "WATCH_NAMESPACE",
        "FIELD_MANAGER",
        "ERROR_BACKOFF_BASE_SECS",
        "ERROR_BACKOFF_MAX_SECS",
        "STALE_REQUEUE_SECS",
        "WATCH_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        clear_env();
        let config = OperatorConfig::from_env().unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.field_manager, "kubetorio");
        assert_eq!(config.stale_requeue, Duration::from_secs(2));
        assert_eq!(config.watch_timeout_secs, 25);
    }

    #[test]
    #[serial]
    fn reads_overrides_from_env() {
        clear_env();
        std::env::set_var("WATCH_NAMESPACE", "games");
        std::env::set_var("ERROR_BACKOFF_BASE_SECS", "1");
        std::env::set_var("ERROR_BACKOFF_MAX_SECS", "30");

        let config = OperatorConfig::from_env().unwrap();
        assert_eq!(config.namespace.as_deref(), Some("games"));
        assert_eq!(config.backoff().delay(3), Duration::from_secs(4));
        clear_env();
    }

    #[test]
    #[serial]
    fn rejects_garbage_numbers() {
        clear_env();
        std::env::set_var("STALE_REQUEUE_SECS", "soon");
        let err = OperatorConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        clear_env();
    }

    #[test]
    #[serial]
    fn rejects_watch_timeout_past_client_timeout() {
        clear_env();
        std::env::set_var("WATCH_TIMEOUT_SECS", "30");
        assert!(OperatorConfig::from_env().is_err());
        clear_env();
    }
}
