mod common;

use anyhow::Result;
use testing_framework_core::{
    chain::agenda_len,
    schedule::{ScheduleError, ScheduleId, ScheduledOperationSpec},
};
use testing_framework_runner_local::DevSigner;
use testing_framework_workflows::matchers::{scheduler_canceled, scheduler_dispatched};

use crate::common::{deploy_interval, deploy_manual, harness_config, remark_call, until_pooled};

#[tokio::test]
async fn named_schedule_collides_while_its_id_is_live() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let harness = run.harness();
    let signer = DevSigner::alice();
    let id = ScheduleId::from_label("collide")?;
    let remark = remark_call(harness, "x")?;

    let spec = ScheduledOperationSpec::after(100).named(id);
    let receipt = harness
        .scheduler()
        .schedule(signer.as_ref(), spec, remark.clone())
        .await?;
    assert_eq!(receipt.id, Some(id));
    assert!(receipt.address.is_some());

    let err = harness
        .scheduler()
        .schedule(signer.as_ref(), spec, remark)
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Collision { id: collided } if collided == id));
    Ok(())
}

#[tokio::test]
async fn same_id_pooled_into_one_block_collides_once() -> Result<()> {
    let run = deploy_manual().await?;
    let id = ScheduleId::from_label("same-block")?;
    let spec = ScheduledOperationSpec::after(10).named(id);

    let mut pending = Vec::new();
    for sender in ["alice", "bob"] {
        let harness = run.harness().clone();
        let remark = remark_call(&harness, sender)?;
        pending.push(tokio::spawn(async move {
            let signer = DevSigner::dev(sender);
            harness.scheduler().schedule(&signer, spec, remark).await
        }));
    }
    until_pooled(run.chain(), 2).await;
    run.chain().seal_block();

    let mut scheduled = 0;
    let mut collided = 0;
    for task in pending {
        match task.await? {
            Ok(receipt) => {
                assert_eq!(receipt.id, Some(id));
                scheduled += 1;
            }
            Err(ScheduleError::Collision { id: reported }) => {
                assert_eq!(reported, id);
                collided += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((scheduled, collided), (1, 1));
    assert_eq!(agenda_len(run.harness().client().as_ref()).await?, 1);
    Ok(())
}

#[tokio::test]
async fn live_id_collides_before_the_target_is_checked() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let harness = run.harness();
    let signer = DevSigner::alice();
    let id = ScheduleId::from_label("live")?;

    harness
        .scheduler()
        .schedule(
            signer.as_ref(),
            ScheduledOperationSpec::after(100).named(id),
            remark_call(harness, "later")?,
        )
        .await?;
    harness.wait_for_blocks(2).await?;

    let err = harness
        .scheduler()
        .schedule(
            signer.as_ref(),
            ScheduledOperationSpec::at(1).named(id),
            remark_call(harness, "past")?,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Collision { id: collided } if collided == id));
    Ok(())
}

#[tokio::test]
async fn relative_schedule_fires_and_agenda_drains() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let harness = run.harness();
    let signer = DevSigner::alice();
    let dispatched = harness.capture_events(scheduler_dispatched()).await?;

    let remark = remark_call(harness, "soon")?;
    let receipt = harness.schedule_after(signer.as_ref(), 1, remark).await?;
    let address = receipt.address.expect("scheduled event reported");
    assert_eq!(address.block, receipt.settled_in.number + 2);

    harness.waits().wait_for_empty_agenda().await?;
    harness.wait_for_blocks(0).await?;
    let fired = dispatched.captured();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].task.when, address.block);
    assert!(fired[0].succeeded());
    Ok(())
}

#[tokio::test]
async fn canceled_named_task_never_fires() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let harness = run.harness();
    let signer = DevSigner::alice();
    let id = harness.scheduler().next_id();
    let remark = remark_call(harness, "never")?;

    let spec = ScheduledOperationSpec::after(20).named(id);
    harness
        .scheduler()
        .schedule(signer.as_ref(), spec, remark)
        .await?;
    assert_eq!(agenda_len(harness.client().as_ref()).await?, 1);

    let settlement = harness.scheduler().cancel_named(signer.as_ref(), &id).await?;
    let canceled = scheduler_canceled().decode_all(&settlement.events)?;
    assert_eq!(canceled.len(), 1);
    assert_eq!(agenda_len(harness.client().as_ref()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn past_targets_are_rejected_by_the_backend() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let harness = run.harness();
    let signer = DevSigner::alice();
    harness.wait_for_blocks(1).await?;
    let remark = remark_call(harness, "late")?;

    let err = harness
        .schedule_at(signer.as_ref(), 1, remark)
        .await
        .unwrap_err();
    match err {
        ScheduleError::BackendRejected { failure, .. } => {
            assert_eq!(failure.name, "scheduler.TargetBlockNumberInPast");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
