use std::{process, time::Duration};

use anyhow::{Context as _, Result};
use runner_demos::{ScenarioBuilderExt as _, defaults, env_or};
use serde_json::json;
use testing_framework_core::{
    provision::ProvisioningRequest,
    schedule::ScheduledOperationSpec,
    scenario::{DynError, Harness, ScenarioBuilder},
};
use testing_framework_runner_local::{DevSigner, LocalChainConfig, LocalDeployer};
use testing_framework_workflows::matchers::{
    democracy_started, scheduler_dispatched, system_remarked,
};
use tracing::{info, warn};

const REFERENDUM_SEARCH_BLOCKS: u64 = 5;
const PERIOD_BLOCKS: u32 = 2;
const PERIOD_REPETITIONS: u32 = 3;
const DRAIN_BLOCKS: u64 = 20;

#[tokio::main]
async fn main() {
    defaults::init_tracing();

    let users = env_or("TF_DEMO_USERS", defaults::DEFAULT_USERS);
    let seal_millis = env_or("TF_DEMO_SEAL_MILLIS", defaults::DEFAULT_SEAL_MILLIS);
    let target_units = env_or("TF_DEMO_TARGET_UNITS", defaults::DEFAULT_TARGET_UNITS);

    info!(users, seal_millis, target_units, "starting local scenario demo");

    if let Err(err) = run_local_case(users, Duration::from_millis(seal_millis), target_units).await
    {
        warn!("local scenario demo failed: {err:#}");
        process::exit(1);
    }
}

async fn run_local_case(users: usize, seal_every: Duration, target_units: u128) -> Result<()> {
    let deployer =
        LocalDeployer::new().with_chain_config(LocalChainConfig::interval(seal_every));
    let run = deployer.deploy().await.context("starting local chain failed")?;

    let mut scenario = ScenarioBuilder::new()
        .expect_scheduler_drained(DRAIN_BLOCKS)
        .expect_block_progress(u64::from(PERIOD_BLOCKS * PERIOD_REPETITIONS))
        .expect_event(system_remarked(), users + PERIOD_REPETITIONS as usize)
        .expect_event(scheduler_dispatched(), PERIOD_REPETITIONS as usize)
        .cooldown_blocks(2)
        .build();

    info!("running scenario");
    run.run(&mut scenario, move |harness| {
        drive(harness, users, target_units)
    })
    .await
    .context("running local scenario failed")?;
    info!(head = run.chain().head().number, "scenario complete");

    Ok(())
}

async fn drive(harness: Harness, users: usize, target_units: u128) -> Result<(), DynError> {
    let alice = DevSigner::alice();
    let requests = vec![ProvisioningRequest::new(target_units); users];
    let accounts = harness.provision_accounts(&requests, alice.as_ref()).await?;
    info!(accounts = accounts.len(), "accounts funded");

    for (index, account) in accounts.iter().enumerate() {
        let remark = harness.build_call(
            "system",
            "remarkWithEvent",
            vec![json!(format!("hello from user {index}")).into()],
        )?;
        harness.submit(account.signer.as_ref(), remark).await?;
    }

    let heartbeat = harness.build_call("system", "remarkWithEvent", vec![json!("heartbeat").into()])?;
    let spec = ScheduledOperationSpec::after(1)
        .periodic(PERIOD_BLOCKS, PERIOD_REPETITIONS)
        .named(harness.scheduler().next_id());
    let receipt = harness
        .scheduler()
        .schedule(alice.as_ref(), spec, heartbeat)
        .await?;
    info!(id = ?receipt.id, address = ?receipt.address, "heartbeat scheduled");

    let referendum = harness.build_call(
        "dev",
        "emit",
        vec![
            json!("democracy").into(),
            json!("Started").into(),
            json!([0, "SimpleMajority"]).into(),
        ],
    )?;
    let started_event = democracy_started();
    let (started, settlement) = tokio::join!(
        harness.expect_event(REFERENDUM_SEARCH_BLOCKS, &started_event, |started| {
            started.ref_index == 0
        }),
        harness.submit(alice.as_ref(), referendum),
    );
    settlement?;
    let started = started?;
    info!(ref_index = started.ref_index, threshold = %started.threshold, "referendum observed");

    let drained = harness.waits().wait_for_empty_agenda().await?;
    info!(block = drained.number, "heartbeat finished");

    Ok(())
}
