//! Service configuration.
//!
//! Loaded once at startup and immutable afterwards. Sources, in order (later
//! sources override earlier ones):
//!  1. /etc/visibility-keeper/service.yaml   — system-wide defaults
//!  2. ./config/service.yaml                 — deployment-local override
//!  3. Path given by VK_CONFIG_FILE env      — operator-specified file
//!  4. Environment variables prefixed VK__ (double-underscore separator),
//!     e.g. VK__KEEPER__POLL_BATCH_SIZE=5 sets keeper.poll_batch_size
//!
//! Every field carries a serde default except the queue URL and the AWS
//! credentials, which have no sensible default and make startup fail when
//! absent.

use serde::Deserialize;
use thiserror::Error;
use visibility_runtime::sqs::MAX_VISIBILITY_TIMEOUT_SECS;
use visibility_runtime::{QueueUrl, SqsConfig, MAX_RECEIVE_BATCH};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Configuration errors; all fatal to process startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {message}")]
    Load { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },
}

// ============================================================================
// Configuration Sections
// ============================================================================

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub keeper: KeeperConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    pub aws: SqsConfig,
}

/// Configuration for the poll-and-extend cycle
#[derive(Debug, Clone, Deserialize)]
pub struct KeeperConfig {
    /// Queue endpoint the keeper polls
    pub queue_url: String,

    /// Period between cycle starts (fixed-rate)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Messages drained per cycle
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u32,

    /// Invisibility window applied to every drained message, in milliseconds;
    /// converted once to whole seconds at startup (truncating)
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,

    /// Reserved for future bounding logic; logged at startup only
    #[serde(default = "default_time_bound_ms")]
    pub time_bound_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    86_400_000
}

fn default_poll_batch_size() -> u32 {
    10
}

fn default_visibility_timeout_ms() -> u64 {
    300_000
}

fn default_time_bound_ms() -> u64 {
    60_000
}

/// Configuration for the test-message publisher endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Messages published per request
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_burst_size() -> u32 {
    15
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl ServiceConfig {
    /// Load configuration from the standard sources
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/visibility-keeper/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Ok(explicit_path) = std::env::var("VK_CONFIG_FILE") {
            if !explicit_path.is_empty() {
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
            }
        }

        let raw = builder
            .add_source(config::Environment::with_prefix("VK").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load {
                message: e.to_string(),
            })?;

        raw.try_deserialize().map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })
    }

    /// Load configuration from a single explicit file, bypassing the standard
    /// sources. Intended for tests and one-off tooling.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name(path).format(config::FileFormat::Yaml))
            .build()
            .map_err(|e| ConfigError::Load {
                message: e.to_string(),
            })?;

        raw.try_deserialize().map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })
    }

    /// Validate the configuration; any error here is fatal to startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keeper.validate()
    }
}

impl KeeperConfig {
    /// The queue endpoint as a validated domain type
    pub fn queue_url(&self) -> Result<QueueUrl, ConfigError> {
        QueueUrl::new(self.queue_url.clone()).map_err(|e| ConfigError::Invalid {
            key: "keeper.queue_url".to_string(),
            message: e.to_string(),
        })
    }

    /// Visibility timeout in whole seconds, truncating sub-second remainder.
    ///
    /// 300 000 ms -> 300 s; 1 500 ms -> 1 s. A value that truncates to zero
    /// is rejected by [`KeeperConfig::validate`] before this is ever used.
    pub fn visibility_timeout_secs(&self) -> u32 {
        (self.visibility_timeout_ms / 1000).min(u64::from(u32::MAX)) as u32
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.is_empty() {
            return Err(ConfigError::Missing {
                key: "keeper.queue_url".to_string(),
            });
        }
        self.queue_url()?;

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "keeper.poll_interval_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.poll_batch_size == 0 || self.poll_batch_size > MAX_RECEIVE_BATCH {
            return Err(ConfigError::Invalid {
                key: "keeper.poll_batch_size".to_string(),
                message: format!("must be 1-{}", MAX_RECEIVE_BATCH),
            });
        }

        // A sub-second timeout truncates to zero seconds, which would make
        // extended messages immediately visible again. Reject at startup
        // instead of silently defeating the keep-alive.
        let secs = self.visibility_timeout_secs();
        if secs == 0 {
            return Err(ConfigError::Invalid {
                key: "keeper.visibility_timeout_ms".to_string(),
                message: format!(
                    "{} ms truncates to a zero-second visibility timeout",
                    self.visibility_timeout_ms
                ),
            });
        }

        if secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                key: "keeper.visibility_timeout_ms".to_string(),
                message: format!(
                    "{} s exceeds the queue service maximum of {} s",
                    secs, MAX_VISIBILITY_TIMEOUT_SECS
                ),
            });
        }

        Ok(())
    }
}
