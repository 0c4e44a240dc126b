//! Bulk creation of funded scenario accounts with bounded retries.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use testing_framework_config::ProvisioningConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    chain::{
        self, AccountId, Balance, Call, CallBuilder, ChainClient, ChainError, Keyring, Nonce,
        Settlement, Signer, Submitter,
        paths::{BALANCES_SECTION, TRANSFER_METHOD},
    },
    scenario::DynError,
    wait::{WaitEngine, WaitError},
};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(
        "{outstanding} of {requested} account(s) still unfunded after {attempts} attempt(s)"
    )]
    Exhausted {
        outstanding: usize,
        requested: usize,
        attempts: usize,
    },
    #[error("request {slot} asks for {units} unit(s), which overflows the balance type")]
    TargetOverflow { slot: usize, units: Balance },
    #[error("building the funding transfer failed: {0}")]
    Build(#[source] DynError),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// One account to create, funded to `target_balance` whole currency units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub target_balance: Balance,
}

impl ProvisioningRequest {
    #[must_use]
    pub const fn new(target_balance: Balance) -> Self {
        Self { target_balance }
    }
}

#[derive(Clone)]
pub struct ProvisionedAccount {
    pub signer: Arc<dyn Signer>,
    /// Raw free balance observed when the account was confirmed funded.
    pub balance: Balance,
}

impl ProvisionedAccount {
    #[must_use]
    pub fn address(&self) -> &AccountId {
        self.signer.address()
    }
}

impl std::fmt::Debug for ProvisionedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedAccount")
            .field("address", self.address())
            .field("balance", &self.balance)
            .finish()
    }
}

struct Pending {
    slot: usize,
    signer: Arc<dyn Signer>,
    target: Balance,
    observed: Balance,
}

impl Pending {
    const fn deficit(&self) -> Balance {
        self.target.saturating_sub(self.observed)
    }
}

/// Creates and funds fresh accounts from a donor. Balances re-read after
/// each attempt decide what is funded; transfer outcomes only feed logs.
#[derive(Clone)]
pub struct ScenarioAccountProvisioner {
    client: Arc<dyn ChainClient>,
    submitter: Arc<dyn Submitter>,
    keyring: Arc<dyn Keyring>,
    calls: Arc<dyn CallBuilder>,
    waits: WaitEngine,
    config: ProvisioningConfig,
}

impl ScenarioAccountProvisioner {
    #[must_use]
    pub fn new(
        submitter: Arc<dyn Submitter>,
        keyring: Arc<dyn Keyring>,
        calls: Arc<dyn CallBuilder>,
        waits: WaitEngine,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            client: waits.block_stream().client(),
            submitter,
            keyring,
            calls,
            waits,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Returns one funded account per request, in request order, or fails
    /// with the number still unfunded once every attempt is spent.
    pub async fn provision(
        &self,
        requests: &[ProvisioningRequest],
        donor: &dyn Signer,
    ) -> Result<Vec<ProvisionedAccount>, ProvisionError> {
        let nominal = self.config.nominal();
        let targets = requests
            .iter()
            .enumerate()
            .map(|(slot, request)| {
                request
                    .target_balance
                    .checked_mul(nominal)
                    .ok_or(ProvisionError::TargetOverflow {
                        slot,
                        units: request.target_balance,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut funded: Vec<Option<ProvisionedAccount>> = vec![None; requests.len()];
        let mut pending = Vec::new();

        for (slot, target) in targets.into_iter().enumerate() {
            let signer = self.keyring.generate();
            if target == 0 {
                funded[slot] = Some(ProvisionedAccount { signer, balance: 0 });
                continue;
            }
            pending.push(Pending {
                slot,
                signer,
                target,
                observed: 0,
            });
        }

        info!(
            donor = %donor.address(),
            requested = requests.len(),
            to_fund = pending.len(),
            "provisioning scenario accounts"
        );

        let mut attempts = 0;
        while !pending.is_empty() && attempts < self.config.max_attempts {
            attempts += 1;
            self.attempt(donor, &pending, attempts).await?;
            pending = self.confirm(pending, &mut funded).await;
            info!(attempt = attempts, outstanding = pending.len(), "provisioning attempt finished");
        }

        if !pending.is_empty() {
            return Err(ProvisionError::Exhausted {
                outstanding: pending.len(),
                requested: requests.len(),
                attempts,
            });
        }

        Ok(funded.into_iter().flatten().collect())
    }

    /// Submits top-up transfers for `pending` in batches sharing one locally
    /// incremented nonce sequence, then waits for them to settle.
    async fn attempt(
        &self,
        donor: &dyn Signer,
        pending: &[Pending],
        attempt: usize,
    ) -> Result<(), ProvisionError> {
        let mut nonce = match chain::account_nonce(self.client.as_ref(), donor.address()).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(attempt, %err, "reading donor nonce failed, skipping submissions");
                return self.settle(1).await;
            }
        };

        let batches = pending.chunks(self.config.batch_size.max(1));
        let batch_count = batches.len();
        for (batch_index, batch) in batches.enumerate() {
            let mut transfers = Vec::with_capacity(batch.len());
            for account in batch {
                let call = self.transfer(account.signer.address(), account.deficit())?;
                transfers.push(self.submit(donor, call, nonce));
                nonce += 1;
            }

            let outcomes = join_all(transfers).await;
            let failed = outcomes.iter().filter(|outcome| !outcome_ok(outcome)).count();
            if failed > 0 {
                warn!(attempt, batch = batch_index, failed, "funding transfers failed");
            }
            debug!(
                attempt,
                batch = batch_index,
                submitted = outcomes.len(),
                failed,
                "funding batch settled"
            );
        }

        self.settle(self.config.settle_window(batch_count)).await
    }

    async fn settle(&self, blocks: u64) -> Result<(), ProvisionError> {
        if blocks > 0 {
            self.waits.wait_for_blocks(blocks - 1).await?;
        }
        Ok(())
    }

    /// Re-reads balances, moving accounts at or above target into `funded`
    /// and returning the rest.
    async fn confirm(
        &self,
        pending: Vec<Pending>,
        funded: &mut [Option<ProvisionedAccount>],
    ) -> Vec<Pending> {
        let balances = join_all(
            pending
                .iter()
                .map(|account| chain::free_balance(self.client.as_ref(), account.signer.address())),
        )
        .await;

        let mut still_pending = Vec::new();
        for (mut account, balance) in pending.into_iter().zip(balances) {
            match balance {
                Ok(balance) if balance >= account.target => {
                    funded[account.slot] = Some(ProvisionedAccount {
                        signer: account.signer,
                        balance,
                    });
                }
                Ok(balance) => {
                    account.observed = balance;
                    still_pending.push(account);
                }
                Err(err) => {
                    warn!(account = %account.signer.address(), %err, "balance query failed");
                    still_pending.push(account);
                }
            }
        }
        still_pending
    }

    fn transfer(&self, to: &AccountId, amount: Balance) -> Result<Call, ProvisionError> {
        self.calls
            .build_call(
                BALANCES_SECTION,
                TRANSFER_METHOD,
                vec![json!(to.as_str()).into(), json!(amount.to_string()).into()],
            )
            .map_err(ProvisionError::Build)
    }

    async fn submit(
        &self,
        donor: &dyn Signer,
        call: Call,
        nonce: Nonce,
    ) -> Result<Settlement, ChainError> {
        self.submitter.submit(donor, call, Some(nonce)).await
    }
}

fn outcome_ok(outcome: &Result<Settlement, ChainError>) -> bool {
    outcome.as_ref().is_ok_and(Settlement::is_success)
}
