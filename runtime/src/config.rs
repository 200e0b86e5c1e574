//! Config - Machine Tuning
//!
//! A [`FlowConfig`] can be built in code, parsed from TOML or read from the
//! environment:
//!
//! | Variable                    | Field                 | Default |
//! |-----------------------------|-----------------------|---------|
//! | `REVIR_MAX_BRANCH_DEPTH`    | `max_branch_depth`    | `32`    |
//! | `REVIR_RESOLVER_TIMEOUT_MS` | `resolver_timeout_ms` | none    |

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const ENV_MAX_BRANCH_DEPTH: &str = "REVIR_MAX_BRANCH_DEPTH";
pub const ENV_RESOLVER_TIMEOUT_MS: &str = "REVIR_RESOLVER_TIMEOUT_MS";

pub const DEFAULT_MAX_BRANCH_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid flow configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("max_branch_depth must be at least 1")]
    ZeroDepth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// How many branch resolutions one request may chain before it fails
    /// with a cyclic-branch error.
    pub max_branch_depth: usize,
    /// Upper bound for a single resolver call. `None` waits forever.
    pub resolver_timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_branch_depth: DEFAULT_MAX_BRANCH_DEPTH,
            resolver_timeout_ms: None,
        }
    }
}

impl FlowConfig {
    pub fn with_max_branch_depth(mut self, depth: usize) -> Self {
        self.max_branch_depth = depth;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn resolver_timeout(&self) -> Option<Duration> {
        self.resolver_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a TOML table. Missing fields keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()
    }

    /// Defaults overridden by `REVIR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_BRANCH_DEPTH) {
            config.max_branch_depth = parse_env(ENV_MAX_BRANCH_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RESOLVER_TIMEOUT_MS) {
            config.resolver_timeout_ms = Some(parse_env(ENV_RESOLVER_TIMEOUT_MS, &raw)?);
        }
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_branch_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(self)
    }
}

fn parse_env<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
