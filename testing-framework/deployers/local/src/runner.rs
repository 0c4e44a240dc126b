use std::{future::Future, sync::Arc};

use testing_framework_config::{ConfigError, HarnessConfig};
use testing_framework_core::{
    chain::{Keyring, Signer},
    scenario::{DynError, Harness, HarnessBuilder, Scenario, ScenarioError},
    wait::WaitError,
};
use thiserror::Error;
use tracing::info;

use crate::{
    chain::{LocalChain, Sealer},
    config::LocalChainConfig,
    keyring::{DevKeyring, DevSigner},
};

/// Starts an in-process chain and wires a harness to it.
#[derive(Clone, Default)]
pub struct LocalDeployer {
    chain: LocalChainConfig,
    harness: Option<HarnessConfig>,
}

/// Errors surfaced by the local deployer while driving a scenario.
#[derive(Debug, Error)]
pub enum LocalDeployerError {
    #[error("invalid harness config: {source}")]
    Config {
        #[source]
        source: ConfigError,
    },
    #[error("scenario body failed: {source}")]
    BodyFailed {
        #[source]
        source: DynError,
    },
    #[error("cooldown failed: {source}")]
    CooldownFailed {
        #[source]
        source: WaitError,
    },
    #[error("expectations failed: {source}")]
    ExpectationsFailed {
        #[source]
        source: DynError,
    },
}

impl From<ScenarioError> for LocalDeployerError {
    fn from(value: ScenarioError) -> Self {
        match value {
            ScenarioError::Body(source) => Self::BodyFailed { source },
            ScenarioError::Cooldown(source) => Self::CooldownFailed { source },
            err @ ScenarioError::ExpectationCapture { .. } => Self::ExpectationsFailed {
                source: Box::new(err),
            },
            ScenarioError::Expectations(source) => Self::ExpectationsFailed { source },
        }
    }
}

impl LocalDeployer {
    #[must_use]
    /// Construct a local deployer.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chain_config(mut self, config: LocalChainConfig) -> Self {
        self.chain = config;
        self
    }

    /// Uses `config` instead of [`HarnessConfig::from_env`].
    #[must_use]
    pub fn with_harness_config(mut self, config: HarnessConfig) -> Self {
        self.harness = Some(config);
        self
    }

    /// Must be called inside a tokio runtime when interval sealing is used.
    pub async fn deploy(&self) -> Result<LocalRun, LocalDeployerError> {
        let harness_config = match &self.harness {
            Some(config) => config.clone(),
            None => HarnessConfig::from_env()
                .map_err(|source| LocalDeployerError::Config { source })?,
        };

        info!(sealing = ?self.chain.sealing, "starting local chain");
        let (chain, sealer) = LocalChain::start(&self.chain);
        let keyring: Arc<dyn Keyring> = Arc::new(DevKeyring);
        let harness = HarnessBuilder::new(
            Arc::new(chain.clone()),
            Arc::new(chain.clone()),
            keyring,
            Arc::new(chain.clone()),
        )
        .config(harness_config)
        .build();

        Ok(LocalRun {
            chain,
            harness,
            sealer,
        })
    }
}

/// A running local chain with its harness. Interval sealing stops when this
/// is dropped.
pub struct LocalRun {
    chain: LocalChain,
    harness: Harness,
    sealer: Option<Sealer>,
}

impl LocalRun {
    #[must_use]
    pub const fn chain(&self) -> &LocalChain {
        &self.chain
    }

    #[must_use]
    pub const fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Endowed genesis signer.
    #[must_use]
    pub fn dev_signer(&self, name: &str) -> Arc<dyn Signer> {
        Arc::new(DevSigner::dev(name))
    }

    pub async fn run<F, Fut>(
        &self,
        scenario: &mut Scenario,
        body: F,
    ) -> Result<(), LocalDeployerError>
    where
        F: FnOnce(Harness) -> Fut,
        Fut: Future<Output = Result<(), DynError>>,
    {
        scenario.run(&self.harness, body).await?;
        Ok(())
    }

    /// Stops interval sealing, leaving the chain in manual mode.
    pub fn stop_sealing(&mut self) {
        if let Some(sealer) = self.sealer.take() {
            sealer.stop();
        }
    }
}
