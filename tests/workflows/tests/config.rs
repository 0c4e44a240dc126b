mod common;

use std::{env, io::Write as _};

use anyhow::Result;
use serial_test::serial;
use testing_framework_core::{HarnessConfig, TimeoutPolicy};
use testing_framework_runner_local::{LocalChainConfig, LocalDeployer};

const HARNESS_CONFIG_VAR: &str = "TF_HARNESS_CONFIG";
const PROVISION_ATTEMPTS_VAR: &str = "TF_PROVISION_ATTEMPTS";

fn set_env(key: &str, value: &str) {
    // SAFETY: tests touching the environment are serialised.
    unsafe {
        env::set_var(key, value);
    }
}

fn clear_env(key: &str) {
    // SAFETY: tests touching the environment are serialised.
    unsafe {
        env::remove_var(key);
    }
}

#[tokio::test]
#[serial]
async fn deployer_loads_the_config_file_named_in_the_environment() -> Result<()> {
    common::init_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "wait:\n  block_timeout_secs: 7\n  on_timeout: abort\nprovisioning:\n  batch_size: 50"
    )?;
    set_env(HARNESS_CONFIG_VAR, &file.path().display().to_string());

    let run = LocalDeployer::new()
        .with_chain_config(LocalChainConfig::manual())
        .deploy()
        .await;
    clear_env(HARNESS_CONFIG_VAR);

    let config = run?.harness().config().clone();
    assert_eq!(config.wait.block_timeout_secs, 7);
    assert_eq!(config.wait.on_timeout, TimeoutPolicy::Abort);
    assert_eq!(config.provisioning.batch_size, 50);
    Ok(())
}

#[test]
#[serial]
fn environment_overrides_apply_on_top_of_defaults() -> Result<()> {
    set_env(PROVISION_ATTEMPTS_VAR, "9");
    let config = HarnessConfig::from_env();
    clear_env(PROVISION_ATTEMPTS_VAR);

    let config = config?;
    assert_eq!(config.provisioning.max_attempts, 9);
    assert_eq!(config.wait, HarnessConfig::default().wait);
    Ok(())
}

#[tokio::test]
#[serial]
async fn unreadable_config_file_fails_deployment() {
    set_env(HARNESS_CONFIG_VAR, "/nonexistent/harness.yaml");
    let run = LocalDeployer::new()
        .with_chain_config(LocalChainConfig::manual())
        .deploy()
        .await;
    clear_env(HARNESS_CONFIG_VAR);

    assert!(run.is_err());
}
