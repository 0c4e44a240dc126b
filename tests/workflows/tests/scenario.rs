mod common;

use anyhow::Result;
use serde_json::json;
use testing_framework_core::{
    provision::ProvisioningRequest,
    scenario::{DynError, Harness, ScenarioBuilder},
};
use testing_framework_runner_local::{DevSigner, LocalDeployerError};
use testing_framework_workflows::{
    ScenarioBuilderExt as _,
    matchers::{balances_transfer, scheduler_dispatched},
};

use crate::common::{deploy_interval, harness_config};

const USERS: usize = 3;

async fn fund_and_schedule(harness: Harness) -> Result<(), DynError> {
    let alice = DevSigner::alice();
    let accounts = harness
        .provision_accounts(&[ProvisioningRequest::new(5); USERS], alice.as_ref())
        .await?;

    let recipient = accounts[0].address().to_string();
    let transfer = harness.build_call(
        "balances",
        "transfer",
        vec![json!(recipient).into(), json!("1").into()],
    )?;
    harness
        .schedule_after(accounts[1].signer.as_ref(), 1, transfer)
        .await?;
    Ok(())
}

#[tokio::test]
async fn funded_accounts_drive_a_scheduled_transfer() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let mut scenario = ScenarioBuilder::new()
        .expect_block_progress(3)
        .expect_scheduler_drained(10)
        .expect_event(balances_transfer(), USERS + 1)
        .expect_event(scheduler_dispatched(), 1)
        .cooldown_blocks(4)
        .build();

    run.run(&mut scenario, fund_and_schedule).await?;
    Ok(())
}

#[tokio::test]
async fn failing_body_skips_expectations() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let mut scenario = ScenarioBuilder::new()
        .expect_event(balances_transfer(), 1)
        .build();

    let err = run
        .run(&mut scenario, |_| async { Err::<(), DynError>("body gave up".into()) })
        .await
        .unwrap_err();
    assert!(matches!(err, LocalDeployerError::BodyFailed { .. }));
    Ok(())
}

#[tokio::test]
async fn every_failed_expectation_is_reported() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let mut scenario = ScenarioBuilder::new()
        .expect_event(balances_transfer(), 1)
        .expect_event(scheduler_dispatched(), 1)
        .cooldown_blocks(1)
        .build();

    let err = run
        .run(&mut scenario, |_| async { Ok(()) })
        .await
        .unwrap_err();
    let report = err.to_string();
    assert!(matches!(err, LocalDeployerError::ExpectationsFailed { .. }));
    assert!(report.contains("balances.Transfer"));
    assert!(report.contains("scheduler.Dispatched"));
    Ok(())
}
