use std::sync::Arc;

use testing_framework_config::HarnessConfig;
use tracing::info;

use super::DynError;
use crate::{
    chain::{
        BlockHeader, BlockNumber, Call, CallArg, CallBuilder, ChainClient, ChainError, Keyring,
        Settlement, Signer, Submitter,
    },
    events::{EventCapture, EventMatcher},
    feed::BlockStream,
    provision::{ProvisionError, ProvisionedAccount, ProvisioningRequest, ScenarioAccountProvisioner},
    schedule::{
        ScheduleError, ScheduleIdAllocator, ScheduleReceipt, ScheduledCallBuilder, Scheduler,
    },
    wait::{WaitEngine, WaitError},
};

/// Assembles a [`Harness`] from the chain collaborators.
pub struct HarnessBuilder {
    client: Arc<dyn ChainClient>,
    submitter: Arc<dyn Submitter>,
    keyring: Arc<dyn Keyring>,
    calls: Arc<dyn CallBuilder>,
    config: HarnessConfig,
    schedule_ids: Option<ScheduleIdAllocator>,
}

impl HarnessBuilder {
    #[must_use]
    pub fn new(
        client: Arc<dyn ChainClient>,
        submitter: Arc<dyn Submitter>,
        keyring: Arc<dyn Keyring>,
        calls: Arc<dyn CallBuilder>,
    ) -> Self {
        Self {
            client,
            submitter,
            keyring,
            calls,
            config: HarnessConfig::default(),
            schedule_ids: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the randomly prefixed schedule id allocator.
    #[must_use]
    pub fn schedule_ids(mut self, allocator: ScheduleIdAllocator) -> Self {
        self.schedule_ids = Some(allocator);
        self
    }

    #[must_use]
    pub fn build(self) -> Harness {
        let blocks = BlockStream::new(Arc::clone(&self.client));
        let waits = WaitEngine::new(blocks, self.config.wait.clone());
        let provisioner = ScenarioAccountProvisioner::new(
            Arc::clone(&self.submitter),
            self.keyring,
            Arc::clone(&self.calls),
            waits.clone(),
            self.config.provisioning.clone(),
        );
        let ids = self
            .schedule_ids
            .unwrap_or_else(ScheduleIdAllocator::random);
        let scheduler = Scheduler::new(
            ScheduledCallBuilder::with_allocator(Arc::clone(&self.calls), ids),
            Arc::clone(&self.submitter),
        );

        info!(
            block_timeout = ?self.config.wait.block_timeout(),
            on_timeout = ?self.config.wait.on_timeout,
            provision_attempts = self.config.provisioning.max_attempts,
            "harness assembled"
        );

        Harness {
            config: self.config,
            waits,
            provisioner,
            scheduler,
            submitter: self.submitter,
            calls: self.calls,
        }
    }
}

/// Facade composing every capability a scenario needs. Cheap to clone.
#[derive(Clone)]
pub struct Harness {
    config: HarnessConfig,
    waits: WaitEngine,
    provisioner: ScenarioAccountProvisioner,
    scheduler: Scheduler,
    submitter: Arc<dyn Submitter>,
    calls: Arc<dyn CallBuilder>,
}

impl Harness {
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub const fn waits(&self) -> &WaitEngine {
        &self.waits
    }

    #[must_use]
    pub const fn provisioner(&self) -> &ScenarioAccountProvisioner {
        &self.provisioner
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn block_stream(&self) -> &BlockStream {
        self.waits.block_stream()
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn ChainClient> {
        self.block_stream().client()
    }

    /// A capture session for `matcher`, not yet started.
    #[must_use]
    pub fn capture<T>(&self, matcher: EventMatcher<T>) -> EventCapture<T>
    where
        T: Clone + Send + 'static,
    {
        EventCapture::new(self.block_stream().clone(), matcher)
    }

    /// A capture session for `matcher` that is already live.
    pub async fn capture_events<T>(
        &self,
        matcher: EventMatcher<T>,
    ) -> Result<EventCapture<T>, ChainError>
    where
        T: Clone + Send + 'static,
    {
        let mut capture = self.capture(matcher);
        capture.start_capture().await?;
        Ok(capture)
    }

    pub async fn wait_for_blocks(&self, count: u64) -> Result<BlockHeader, WaitError> {
        self.waits.wait_for_blocks(count).await
    }

    pub async fn wait_for_event<T, P>(
        &self,
        max_blocks: u64,
        matcher: &EventMatcher<T>,
        predicate: P,
    ) -> Result<Option<T>, WaitError>
    where
        T: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.waits
            .wait_for_event(max_blocks, matcher, predicate)
            .await
    }

    pub async fn expect_event<T, P>(
        &self,
        max_blocks: u64,
        matcher: &EventMatcher<T>,
        predicate: P,
    ) -> Result<T, WaitError>
    where
        T: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.waits.expect_event(max_blocks, matcher, predicate).await
    }

    pub async fn provision_accounts(
        &self,
        requests: &[ProvisioningRequest],
        donor: &dyn Signer,
    ) -> Result<Vec<ProvisionedAccount>, ProvisionError> {
        self.provisioner.provision(requests, donor).await
    }

    pub async fn schedule_at(
        &self,
        signer: &dyn Signer,
        block: BlockNumber,
        call: Call,
    ) -> Result<ScheduleReceipt, ScheduleError> {
        self.scheduler.schedule_at(signer, block, call).await
    }

    pub async fn schedule_after(
        &self,
        signer: &dyn Signer,
        offset: u64,
        call: Call,
    ) -> Result<ScheduleReceipt, ScheduleError> {
        self.scheduler.schedule_after(signer, offset, call).await
    }

    pub fn build_call(
        &self,
        section: &str,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<Call, DynError> {
        self.calls.build_call(section, method, args)
    }

    /// Submits `call` with the backend choosing the nonce.
    pub async fn submit(&self, signer: &dyn Signer, call: Call) -> Result<Settlement, ChainError> {
        self.submitter.submit(signer, call, None).await
    }
}
