use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use testing_framework_config::{WaitConfig, timeouts::blocks_timeout};
use tracing::{debug, info};

use super::{HeaderWatch, Progress, RaceError, Step, WaitError, race_with_timeout};
use crate::{
    chain::{self, BlockHeader, ChainClient, ChainError},
    events::EventMatcher,
    feed::BlockStream,
};

/// Resolves waits on block progress, emitted events and derived conditions.
#[derive(Clone)]
pub struct WaitEngine {
    blocks: BlockStream,
    config: WaitConfig,
}

impl WaitEngine {
    #[must_use]
    pub const fn new(blocks: BlockStream, config: WaitConfig) -> Self {
        Self { blocks, config }
    }

    #[must_use]
    pub const fn block_stream(&self) -> &BlockStream {
        &self.blocks
    }

    #[must_use]
    pub const fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Resolves after `count + 1` header deliveries, returning the last one.
    /// Only headers produced after the call count, so `count == 0` still
    /// waits for the next block. Deliveries are counted rather than block
    /// numbers compared, since instant-seal backends may repeat a number.
    pub async fn wait_for_blocks(&self, count: u64) -> Result<BlockHeader, WaitError> {
        let deliveries = count.saturating_add(1);
        let progress = Progress::new(deliveries);
        let deadline = blocks_timeout(self.config.block_timeout(), deliveries);
        let watch = BlockCountdown {
            requested: count,
            remaining: count,
            progress: progress.clone(),
        };
        self.watch(watch, Some(deadline), progress).await
    }

    /// Scans the events of at most `max_blocks` new blocks for the first one
    /// matching `matcher` whose decoded form satisfies `predicate`. Returns
    /// `Ok(None)` when the budget is spent without a match.
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
        if max_blocks == 0 {
            return Ok(None);
        }

        let progress = Progress::new(max_blocks);
        let deadline = blocks_timeout(self.config.block_timeout(), max_blocks);
        let watch = EventSearch {
            client: self.blocks.client(),
            matcher: matcher.clone(),
            predicate,
            budget: max_blocks,
            scanned: 0,
            progress: progress.clone(),
        };
        let found = self.watch(watch, Some(deadline), progress).await?;
        info!(
            category = matcher.category(),
            kind = matcher.kind(),
            max_blocks,
            found = found.is_some(),
            "event wait finished"
        );
        Ok(found)
    }

    /// Like [`Self::wait_for_event`], but a missing event is an error.
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
        self.wait_for_event(max_blocks, matcher, predicate)
            .await?
            .ok_or_else(|| WaitError::NotFound {
                category: matcher.category().to_owned(),
                kind: matcher.kind().to_owned(),
                blocks: max_blocks,
            })
    }

    /// Resolves with the first new header satisfying `predicate`.
    pub async fn wait_until_condition<P>(&self, predicate: P) -> Result<BlockHeader, WaitError>
    where
        P: FnMut(&BlockHeader) -> bool + Send + 'static,
    {
        let progress = Progress::default();
        self.watch(Condition { predicate }, None, progress).await
    }

    /// Resolves with the first new header whose number is a multiple of
    /// `multiple` (treated as 1 when zero).
    pub async fn wait_for_block_multiple(&self, multiple: u64) -> Result<BlockHeader, WaitError> {
        let multiple = multiple.max(1);
        self.wait_until_condition(move |header| header.number % multiple == 0)
            .await
    }

    /// Runs `check` on every new header and resolves on the first one where
    /// it reports no pending work.
    pub async fn wait_until_quiescent<F, Fut>(&self, check: F) -> Result<BlockHeader, WaitError>
    where
        F: FnMut(BlockHeader) -> Fut + Send + 'static,
        Fut: Future<Output = Result<usize, ChainError>> + Send + 'static,
    {
        let progress = Progress::default();
        let watch = Quiescence {
            check,
            progress: progress.clone(),
        };
        self.watch(watch, None, progress).await
    }

    /// Resolves once the scheduler agenda holds no pending task.
    pub async fn wait_for_empty_agenda(&self) -> Result<BlockHeader, WaitError> {
        let client = self.blocks.client();
        self.wait_until_quiescent(empty_agenda_check(client)).await
    }

    /// Drives `watch` over a fresh subscription until it is done, optionally
    /// bounded by `deadline`. The subscription is closed on every exit path,
    /// including timeouts, errors and the caller dropping this future.
    pub async fn watch<W: HeaderWatch>(
        &self,
        watch: W,
        deadline: Option<Duration>,
        progress: Progress,
    ) -> Result<W::Output, WaitError> {
        let description = watch.describe();
        let mut subscription = self.blocks.subscribe().await?;
        let _guard = subscription.handle().close_on_drop();

        let task = async move {
            let mut watch = watch;
            while let Some(header) = subscription.next().await {
                debug!(number = header.number, hash = %header.hash, "wait observed header");
                if let Step::Done(output) = watch.on_header(&header).await? {
                    return Ok(output);
                }
            }
            Err::<W::Output, WaitError>(WaitError::SubscriptionClosed)
        };

        match deadline {
            None => task.await,
            Some(deadline) => {
                match race_with_timeout(task, deadline, description, self.config.on_timeout).await
                {
                    Ok(outcome) => outcome,
                    Err(RaceError::Elapsed { message, after }) => Err(WaitError::Timeout {
                        message,
                        remaining: progress.remaining(),
                        after,
                    }),
                    Err(RaceError::Task(err)) => Err(WaitError::Task(err.to_string())),
                }
            }
        }
    }
}

// Built outside the `async fn` so the closure and its future do not capture
// the `&self` lifetime, which trips rustc's higher-ranked `Send` inference.
type AgendaCheck = std::pin::Pin<Box<dyn Future<Output = Result<usize, ChainError>> + Send>>;

fn empty_agenda_check(
    client: Arc<dyn ChainClient>,
) -> impl FnMut(BlockHeader) -> AgendaCheck + Send + 'static {
    move |_| {
        let client: Arc<dyn ChainClient> = Arc::clone(&client);
        Box::pin(async move { chain::agenda_len(client.as_ref()).await })
    }
}

struct BlockCountdown {
    requested: u64,
    remaining: u64,
    progress: Progress,
}

#[async_trait]
impl HeaderWatch for BlockCountdown {
    type Output = BlockHeader;

    fn describe(&self) -> String {
        format!("waiting for {} new block(s)", self.requested)
    }

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<BlockHeader>, WaitError> {
        if self.remaining == 0 {
            self.progress.set(0);
            return Ok(Step::Done(*header));
        }
        self.remaining -= 1;
        self.progress.set(self.remaining + 1);
        Ok(Step::Continue)
    }
}

struct EventSearch<T, P> {
    client: Arc<dyn ChainClient>,
    matcher: EventMatcher<T>,
    predicate: P,
    budget: u64,
    scanned: u64,
    progress: Progress,
}

#[async_trait]
impl<T, P> HeaderWatch for EventSearch<T, P>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    type Output = Option<T>;

    fn describe(&self) -> String {
        format!(
            "waiting for {}.{} event within {} block(s)",
            self.matcher.category(),
            self.matcher.kind(),
            self.budget
        )
    }

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<Option<T>>, WaitError> {
        self.scanned += 1;
        self.progress.set(self.budget - self.scanned);

        let events = self.client.events_at(&header.hash).await?;
        for event in events.iter().filter(|event| self.matcher.matches(event)) {
            let decoded = self.matcher.decode(event)?;
            if (self.predicate)(&decoded) {
                debug!(
                    number = header.number,
                    category = self.matcher.category(),
                    kind = self.matcher.kind(),
                    "matching event found"
                );
                return Ok(Step::Done(Some(decoded)));
            }
        }

        if self.scanned >= self.budget {
            return Ok(Step::Done(None));
        }
        Ok(Step::Continue)
    }
}

struct Condition<P> {
    predicate: P,
}

#[async_trait]
impl<P> HeaderWatch for Condition<P>
where
    P: FnMut(&BlockHeader) -> bool + Send + 'static,
{
    type Output = BlockHeader;

    fn describe(&self) -> String {
        "waiting for block condition".to_owned()
    }

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<BlockHeader>, WaitError> {
        if (self.predicate)(header) {
            return Ok(Step::Done(*header));
        }
        Ok(Step::Continue)
    }
}

struct Quiescence<F> {
    check: F,
    progress: Progress,
}

#[async_trait]
impl<F, Fut> HeaderWatch for Quiescence<F>
where
    F: FnMut(BlockHeader) -> Fut + Send + 'static,
    Fut: Future<Output = Result<usize, ChainError>> + Send + 'static,
{
    type Output = BlockHeader;

    fn describe(&self) -> String {
        "waiting for pending work to drain".to_owned()
    }

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<BlockHeader>, WaitError> {
        let pending = (self.check)(*header).await?;
        self.progress.set(pending as u64);
        if pending == 0 {
            return Ok(Step::Done(*header));
        }
        debug!(number = header.number, pending, "work still pending");
        Ok(Step::Continue)
    }
}
