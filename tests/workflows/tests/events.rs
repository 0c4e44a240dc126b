mod common;

use anyhow::Result;
use serde_json::json;
use testing_framework_core::chain::Call;
use testing_framework_runner_local::{DevSigner, LocalRun};
use testing_framework_workflows::matchers::{democracy_started, system_remarked};

use crate::common::{deploy_manual, remark_call, until_pooled, until_subscribed};

/// Submits `call` from alice and seals the block that includes it.
async fn include(run: &LocalRun, call: Call) -> Result<()> {
    let harness = run.harness().clone();
    let pending = tokio::spawn(async move {
        let signer = DevSigner::alice();
        harness.submit(signer.as_ref(), call).await
    });
    until_pooled(run.chain(), 1).await;
    run.chain().seal_block();
    let settlement = pending.await??;
    assert!(settlement.is_success());
    Ok(())
}

#[tokio::test]
async fn capture_without_blocks_stays_empty() -> Result<()> {
    let run = deploy_manual().await?;
    let mut capture = run.harness().capture(system_remarked());

    capture.start_capture().await?;
    capture.start_capture().await?;
    assert_eq!(run.chain().live_subscriptions(), 1);

    capture.stop_capture();
    capture.stop_capture();
    assert!(capture.is_empty());
    assert!(!capture.is_capturing());
    assert_eq!(run.chain().live_subscriptions(), 0);
    assert_eq!(run.harness().block_stream().open_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn events_after_stop_are_not_captured() -> Result<()> {
    let run = deploy_manual().await?;
    let mut capture = run.harness().capture_events(system_remarked()).await?;

    include(&run, remark_call(run.harness(), "first")?).await?;
    while capture.is_empty() {
        tokio::task::yield_now().await;
    }
    capture.stop_capture();
    let before = capture.len();

    include(&run, remark_call(run.harness(), "second")?).await?;
    assert_eq!(capture.len(), before);
    assert!(capture.captured().iter().all(|r| r.remark == json!("first")));
    Ok(())
}

#[tokio::test]
async fn democracy_start_is_found_in_the_second_block() -> Result<()> {
    let run = deploy_manual().await?;
    let harness = run.harness().clone();
    let waiter = tokio::spawn(async move {
        harness
            .expect_event(3, &democracy_started(), |started| started.ref_index == 0)
            .await
    });
    until_subscribed(run.chain(), 1).await;

    run.chain().seal_block();
    let emit = run
        .harness()
        .build_call(
            "dev",
            "emit",
            vec![
                json!("democracy").into(),
                json!("Started").into(),
                json!([0, "SimpleMajority"]).into(),
            ],
        )
        .map_err(|err| anyhow::anyhow!(err))?;
    include(&run, emit).await?;

    let started = waiter.await??;
    assert_eq!(started.threshold, "SimpleMajority");
    assert_eq!(run.chain().head().number, 2);
    assert_eq!(run.chain().live_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn event_wait_gives_up_after_its_block_budget() -> Result<()> {
    let run = deploy_manual().await?;
    let harness = run.harness().clone();
    let waiter = tokio::spawn(async move {
        harness
            .wait_for_event(2, &democracy_started(), |_| true)
            .await
    });
    until_subscribed(run.chain(), 1).await;

    run.chain().seal_block();
    run.chain().seal_block();

    assert_eq!(waiter.await??, None);
    assert_eq!(run.chain().live_subscriptions(), 0);
    Ok(())
}
