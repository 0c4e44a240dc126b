use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use testing_framework_env as tf_env;
use thiserror::Error;
use tracing::debug;

use crate::{
    adjust_blocks, adjust_timeout,
    constants::{
        DEFAULT_BLOCK_TIMEOUT_SECS, DEFAULT_BLOCKS_PER_EXTRA_BATCH, DEFAULT_NOMINAL_DECIMALS,
        DEFAULT_PROVISION_ATTEMPTS, DEFAULT_PROVISION_BATCH_SIZE, DEFAULT_SETTLE_BLOCKS,
    },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read harness config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse harness config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid harness config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// What happens to a raced operation once its deadline fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// The operation keeps running in the background and its outcome is
    /// discarded. Callers holding subscriptions must close them themselves.
    #[default]
    Detach,
    /// The operation is aborted when the deadline fires.
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub block_timeout_secs: u64,
    pub on_timeout: TimeoutPolicy,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            block_timeout_secs: DEFAULT_BLOCK_TIMEOUT_SECS,
            on_timeout: TimeoutPolicy::Detach,
        }
    }
}

impl WaitConfig {
    /// Per-block budget after slow-environment scaling.
    #[must_use]
    pub fn block_timeout(&self) -> Duration {
        adjust_timeout(Duration::from_secs(self.block_timeout_secs))
    }

    #[must_use]
    pub const fn with_block_timeout_secs(mut self, secs: u64) -> Self {
        self.block_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Outer attempts; each one re-reads the donor nonce and only retries the
    /// still-unfunded remainder.
    pub max_attempts: usize,
    pub batch_size: usize,
    pub settle_blocks: u64,
    pub blocks_per_extra_batch: u64,
    pub nominal_decimals: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PROVISION_ATTEMPTS,
            batch_size: DEFAULT_PROVISION_BATCH_SIZE,
            settle_blocks: DEFAULT_SETTLE_BLOCKS,
            blocks_per_extra_batch: DEFAULT_BLOCKS_PER_EXTRA_BATCH,
            nominal_decimals: DEFAULT_NOMINAL_DECIMALS,
        }
    }
}

impl ProvisioningConfig {
    /// Raw balance of one whole currency unit.
    #[must_use]
    pub fn nominal(&self) -> u128 {
        10u128.saturating_pow(self.nominal_decimals)
    }

    /// Blocks to wait after an attempt that submitted `batches` batches.
    #[must_use]
    pub fn settle_window(&self, batches: usize) -> u64 {
        let extra = (batches.saturating_sub(1) as u64).saturating_mul(self.blocks_per_extra_batch);
        adjust_blocks(self.settle_blocks.saturating_add(extra))
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_settle_blocks(mut self, blocks: u64) -> Self {
        self.settle_blocks = blocks;
        self
    }

    #[must_use]
    pub const fn with_nominal_decimals(mut self, decimals: u32) -> Self {
        self.nominal_decimals = decimals;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "provisioning.max_attempts",
                reason: "must be non-zero",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "provisioning.batch_size",
                reason: "must be non-zero",
            });
        }
        if self.nominal_decimals > 38 {
            return Err(ConfigError::Invalid {
                field: "provisioning.nominal_decimals",
                reason: "must fit a u128 balance (at most 38)",
            });
        }
        Ok(())
    }
}

/// Knobs for the wait engine and the account provisioner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub wait: WaitConfig,
    pub provisioning: ProvisioningConfig,
}

impl HarnessConfig {
    /// Parses a YAML document; missing fields take their defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.provisioning.validate()?;
        Ok(config)
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "loading harness config");
        Self::from_yaml_str(&raw)
    }

    /// Defaults (or the file named by `TF_HARNESS_CONFIG`) with environment
    /// overrides applied on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match tf_env::tf_harness_config() {
            Some(path) => Self::from_yaml_path(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(secs) = tf_env::tf_block_timeout_secs() {
            self.wait.block_timeout_secs = secs;
        }
        if let Some(attempts) = tf_env::tf_provision_attempts() {
            self.provisioning.max_attempts = attempts;
        }
        self.provisioning.validate()?;
        Ok(self)
    }
}
