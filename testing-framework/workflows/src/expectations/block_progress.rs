use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use testing_framework_core::{
    feed::SubscriptionHandle,
    scenario::{DynError, Expectation, Harness},
};
use thiserror::Error;

const DEFAULT_MIN_BLOCKS: u64 = 1;

/// Requires the chain to deliver at least `min_blocks` headers between the
/// start of the run and evaluation.
#[derive(Debug)]
pub struct BlockProgress {
    min_blocks: u64,
    observed: Arc<AtomicU64>,
    session: Option<SubscriptionHandle>,
}

impl Default for BlockProgress {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BLOCKS)
    }
}

#[derive(Debug, Error)]
enum BlockProgressError {
    #[error("block progress capture was never started")]
    NotCaptured,
    #[error("observed {observed} block(s) during the run, expected at least {required}")]
    Stalled { observed: u64, required: u64 },
}

impl BlockProgress {
    #[must_use]
    pub fn new(min_blocks: u64) -> Self {
        Self {
            min_blocks,
            observed: Arc::new(AtomicU64::new(0)),
            session: None,
        }
    }

    #[must_use]
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Expectation for BlockProgress {
    fn name(&self) -> &str {
        "block_progress"
    }

    async fn start_capture(&mut self, harness: &Harness) -> Result<(), DynError> {
        if self.session.is_some() {
            return Ok(());
        }
        let observed = Arc::clone(&self.observed);
        let handle = harness
            .block_stream()
            .subscribe_with(move |header, _| {
                let seen = observed.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::debug!(number = header.number, seen, "block progress observed header");
            })
            .await?;
        self.session = Some(handle);
        Ok(())
    }

    async fn evaluate(&mut self, _harness: &Harness) -> Result<(), DynError> {
        let session = self.session.as_ref().ok_or(BlockProgressError::NotCaptured)?;
        session.close();

        let observed = self.observed();
        if observed < self.min_blocks {
            tracing::warn!(observed, required = self.min_blocks, "chain made too little progress");
            return Err(BlockProgressError::Stalled {
                observed,
                required: self.min_blocks,
            }
            .into());
        }

        tracing::info!(observed, required = self.min_blocks, "block progress satisfied");
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(session) = &self.session {
            session.close();
        }
    }
}

impl Drop for BlockProgress {
    fn drop(&mut self) {
        Expectation::stop_capture(self);
    }
}
