use std::sync::Arc;

use async_trait::async_trait;
use testing_framework_config::timeouts::blocks_timeout;
use testing_framework_core::{
    chain::{BlockHeader, ChainClient, agenda_len},
    scenario::{DynError, Expectation, Harness},
    wait::{HeaderWatch, Progress, Step, WaitError},
};
use thiserror::Error;

const DEFAULT_WITHIN_BLOCKS: u64 = 10;

/// Requires every scheduled task to have fired (or been canceled) within
/// `within_blocks` blocks of evaluation.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerDrained {
    within_blocks: u64,
}

impl Default for SchedulerDrained {
    fn default() -> Self {
        Self {
            within_blocks: DEFAULT_WITHIN_BLOCKS,
        }
    }
}

#[derive(Debug, Error)]
enum SchedulerDrainedError {
    #[error("{pending} scheduled task(s) still pending after {blocks} block(s)")]
    StillPending { pending: usize, blocks: u64 },
}

impl SchedulerDrained {
    #[must_use]
    pub const fn within_blocks(within_blocks: u64) -> Self {
        Self { within_blocks }
    }
}

#[async_trait]
impl Expectation for SchedulerDrained {
    fn name(&self) -> &str {
        "scheduler_drained"
    }

    async fn evaluate(&mut self, harness: &Harness) -> Result<(), DynError> {
        let client = harness.client();
        let pending = agenda_len(client.as_ref()).await?;
        if pending == 0 {
            tracing::info!("scheduler agenda already empty");
            return Ok(());
        }
        if self.within_blocks == 0 {
            return Err(SchedulerDrainedError::StillPending { pending, blocks: 0 }.into());
        }

        tracing::info!(pending, within_blocks = self.within_blocks, "waiting for agenda to drain");
        let progress = Progress::new(self.within_blocks);
        let deadline = blocks_timeout(
            harness.config().wait.block_timeout(),
            self.within_blocks,
        );
        let watch = AgendaDrain {
            client,
            budget: self.within_blocks,
            seen: 0,
            pending,
            progress: progress.clone(),
        };

        match harness.waits().watch(watch, Some(deadline), progress).await? {
            Drain::Empty(header) => {
                tracing::info!(number = header.number, "scheduler agenda drained");
                Ok(())
            }
            Drain::Pending(pending) => {
                tracing::warn!(pending, blocks = self.within_blocks, "scheduler agenda not drained");
                Err(SchedulerDrainedError::StillPending {
                    pending,
                    blocks: self.within_blocks,
                }
                .into())
            }
        }
    }
}

enum Drain {
    Empty(BlockHeader),
    Pending(usize),
}

struct AgendaDrain {
    client: Arc<dyn ChainClient>,
    budget: u64,
    seen: u64,
    pending: usize,
    progress: Progress,
}

#[async_trait]
impl HeaderWatch for AgendaDrain {
    type Output = Drain;

    fn describe(&self) -> String {
        format!("waiting {} block(s) for the scheduler agenda to drain", self.budget)
    }

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<Drain>, WaitError> {
        self.seen += 1;
        self.progress.set(self.budget.saturating_sub(self.seen));
        self.pending = agenda_len(self.client.as_ref()).await?;
        if self.pending == 0 {
            return Ok(Step::Done(Drain::Empty(*header)));
        }
        if self.seen >= self.budget {
            return Ok(Step::Done(Drain::Pending(self.pending)));
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use testing_framework_core::{HarnessConfig, scenario::ScenarioBuilder};
    use testing_framework_runner_local::{DevSigner, LocalChainConfig, LocalDeployer};

    use super::*;

    async fn schedule_remark(harness: Harness, offset: u64) -> Result<(), DynError> {
        let call = harness.build_call("system", "remarkWithEvent", vec![json!("later").into()])?;
        let signer = DevSigner::alice();
        harness.schedule_after(signer.as_ref(), offset, call).await?;
        Ok(())
    }

    #[tokio::test]
    async fn passes_once_scheduled_tasks_fire() {
        let run = LocalDeployer::new()
            .with_chain_config(LocalChainConfig::interval(Duration::from_millis(10)))
            .with_harness_config(HarnessConfig::default())
            .deploy()
            .await
            .unwrap();
        let mut scenario = ScenarioBuilder::new()
            .with_expectation(SchedulerDrained::within_blocks(8))
            .cooldown_blocks(0)
            .build();

        scenario
            .run(run.harness(), |harness| schedule_remark(harness, 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fails_when_tasks_outlive_the_budget() {
        let run = LocalDeployer::new()
            .with_chain_config(LocalChainConfig::interval(Duration::from_millis(10)))
            .with_harness_config(HarnessConfig::default())
            .deploy()
            .await
            .unwrap();
        let mut scenario = ScenarioBuilder::new()
            .with_expectation(SchedulerDrained::within_blocks(2))
            .cooldown_blocks(0)
            .build();

        let err = scenario
            .run(run.harness(), |harness| schedule_remark(harness, 50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still pending"));
    }
}
