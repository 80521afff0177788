//! CLI configuration.

use std::time::Duration;

use spawner_ecs::{FargateConfig, DEFAULT_SERVICE_PORT, LAST_STATUS_POLL_INTERVAL};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port spawned worlds listen on (`SPAWNER_SERVICE_PORT`).
    pub service_port: String,

    /// Wait between status queries while a world starts
    /// (`SPAWNER_POLL_INTERVAL_MS`).
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_port: DEFAULT_SERVICE_PORT.to_string(),
            poll_interval: LAST_STATUS_POLL_INTERVAL,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` finds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("SPAWNER_SERVICE_PORT") {
            if port.is_empty() || port.parse::<u16>().is_err() {
                return Err(ConfigError::Invalid {
                    key: "SPAWNER_SERVICE_PORT",
                    value: port,
                });
            }
            config.service_port = port;
        }

        if let Some(ms) = lookup("SPAWNER_POLL_INTERVAL_MS") {
            match ms.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SPAWNER_POLL_INTERVAL_MS",
                        value: ms,
                    })
                }
            }
        }

        Ok(config)
    }

    /// Adapter configuration derived from this one.
    pub fn fargate(&self) -> FargateConfig {
        FargateConfig {
            poll_interval: self.poll_interval,
            service_port: self.service_port.clone(),
            ..FargateConfig::default()
        }
    }
}
