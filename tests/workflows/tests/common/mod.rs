#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;
use testing_framework_core::{
    HarnessConfig, IS_DEBUG_TRACING, ProvisioningConfig, chain::Call, scenario::Harness,
};
use testing_framework_runner_local::{LocalChain, LocalChainConfig, LocalDeployer, LocalRun};
use tracing_subscriber::EnvFilter;

pub const SEAL_EVERY: Duration = Duration::from_millis(10);

pub fn init_tracing() {
    let default_level = if *IS_DEBUG_TRACING { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Harness defaults with a tighter provisioning loop.
pub fn harness_config(max_attempts: usize) -> HarnessConfig {
    HarnessConfig {
        provisioning: ProvisioningConfig::default()
            .with_max_attempts(max_attempts)
            .with_settle_blocks(1),
        ..HarnessConfig::default()
    }
}

pub async fn deploy_interval(config: HarnessConfig) -> anyhow::Result<LocalRun> {
    init_tracing();
    Ok(LocalDeployer::new()
        .with_chain_config(LocalChainConfig::interval(SEAL_EVERY))
        .with_harness_config(config)
        .deploy()
        .await?)
}

pub async fn deploy_manual() -> anyhow::Result<LocalRun> {
    init_tracing();
    Ok(LocalDeployer::new()
        .with_chain_config(LocalChainConfig::manual())
        .with_harness_config(HarnessConfig::default())
        .deploy()
        .await?)
}

/// Spins until `chain` holds at least `count` live header subscriptions.
pub async fn until_subscribed(chain: &LocalChain, count: usize) {
    while chain.live_subscriptions() < count {
        tokio::task::yield_now().await;
    }
}

/// Spins until `chain` has at least `count` extrinsics waiting in its pool.
pub async fn until_pooled(chain: &LocalChain, count: usize) {
    while chain.pending_extrinsics() < count {
        tokio::task::yield_now().await;
    }
}

pub fn remark_call(harness: &Harness, text: &str) -> anyhow::Result<Call> {
    harness
        .build_call("system", "remarkWithEvent", vec![json!(text).into()])
        .map_err(|err| anyhow::anyhow!(err))
}
