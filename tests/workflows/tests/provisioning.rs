mod common;

use std::collections::HashSet;

use anyhow::Result;
use testing_framework_core::provision::{ProvisionError, ProvisioningRequest};
use testing_framework_runner_local::DevSigner;

use crate::common::{deploy_interval, harness_config};

#[tokio::test]
async fn funds_accounts_across_more_than_one_batch() -> Result<()> {
    let run = deploy_interval(harness_config(1)).await?;
    let requests = vec![ProvisioningRequest::new(1); 501];

    let accounts = run
        .harness()
        .provision_accounts(&requests, DevSigner::alice().as_ref())
        .await?;

    let nominal = run.harness().config().provisioning.nominal();
    assert_eq!(accounts.len(), 501);
    let unique: HashSet<_> = accounts.iter().map(|a| a.address().clone()).collect();
    assert_eq!(unique.len(), 501);
    for account in &accounts {
        assert!(account.balance >= nominal);
        assert_eq!(run.chain().free_balance(account.address()), account.balance);
    }
    // One transfer per account, all landing in a single attempt.
    assert_eq!(run.chain().nonce(&"alice".into()), 501);
    Ok(())
}

#[tokio::test]
async fn zero_targets_stay_empty_and_others_get_whole_units() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    let requests = [ProvisioningRequest::new(10), ProvisioningRequest::new(0)];

    let accounts = run
        .harness()
        .provision_accounts(&requests, DevSigner::alice().as_ref())
        .await?;

    let nominal = run.harness().config().provisioning.nominal();
    assert_eq!(accounts[0].balance, 10 * nominal);
    assert_eq!(accounts[1].balance, 0);
    assert_eq!(run.chain().free_balance(accounts[1].address()), 0);
    Ok(())
}

#[tokio::test]
async fn failed_transfers_are_retried_in_a_later_attempt() -> Result<()> {
    let run = deploy_interval(harness_config(3)).await?;
    run.chain().fail_next_transfers(1);
    let requests = [ProvisioningRequest::new(2), ProvisioningRequest::new(3)];

    let accounts = run
        .harness()
        .provision_accounts(&requests, DevSigner::alice().as_ref())
        .await?;

    let nominal = run.harness().config().provisioning.nominal();
    assert_eq!(accounts[0].balance, 2 * nominal);
    assert_eq!(accounts[1].balance, 3 * nominal);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_the_configured_attempts() -> Result<()> {
    let run = deploy_interval(harness_config(2)).await?;
    run.chain().fail_next_transfers(usize::MAX);

    let err = run
        .harness()
        .provision_accounts(&[ProvisioningRequest::new(1)], DevSigner::alice().as_ref())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Exhausted {
            outstanding: 1,
            requested: 1,
            attempts: 2,
        }
    ));
    Ok(())
}
