use crate::error::ProvisionError;
use backon::ExponentialBuilder;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "provisioner.toml";
pub const ENV_PREFIX: &str = "PROVISIONER_";

/// Role granted to document-store users on their own database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentRole {
    #[default]
    #[serde(rename = "readWrite")]
    ReadWrite,
    #[serde(rename = "dbOwner")]
    DbOwner,
}

impl DocumentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentRole::ReadWrite => "readWrite",
            DocumentRole::DbOwner => "dbOwner",
        }
    }
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded backoff for steps classified transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_times: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay_ms: 500,
            max_delay_ms: 3_000,
        }
    }
}

impl RetryConfig {
    /// No retries at all; transient failures abort on the first attempt.
    pub fn disabled() -> Self {
        Self {
            max_times: 0,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)))
            .with_max_times(self.max_times)
            .with_jitter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loglevel: String,
    pub connect_timeout_secs: u64,
    pub retry: RetryConfig,
    pub document_role: DocumentRole,
    /// Host part of MySQL account names.
    pub mysql_user_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            connect_timeout_secs: 10,
            retry: RetryConfig::default(),
            document_role: DocumentRole::default(),
            mysql_user_host: "%".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then `provisioner.toml` if present, then `PROVISIONER_*`
    /// environment variables (`PROVISIONER_RETRY__MAX_TIMES=5`).
    pub fn load() -> Result<Self, ProvisionError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ProvisionError> {
        Ok(Self::figment(path).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
