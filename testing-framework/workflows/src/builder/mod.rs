use testing_framework_core::{events::EventMatcher, scenario::ScenarioBuilder};

use crate::expectations::{BlockProgress, EventEmitted, SchedulerDrained};

/// Extension methods for attaching the common expectations to a scenario.
pub trait ScenarioBuilderExt: Sized {
    #[must_use]
    /// Require at least `min_blocks` blocks to be produced during the run.
    fn expect_block_progress(self, min_blocks: u64) -> Self;

    #[must_use]
    /// Require the scheduler agenda to be empty within `within_blocks` blocks
    /// of evaluation.
    fn expect_scheduler_drained(self, within_blocks: u64) -> Self;

    #[must_use]
    /// Require at least `min_count` events matching `matcher` during the run.
    fn expect_event<T>(self, matcher: EventMatcher<T>, min_count: usize) -> Self
    where
        T: Clone + Send + Sync + 'static;
}

impl ScenarioBuilderExt for ScenarioBuilder {
    fn expect_block_progress(self, min_blocks: u64) -> Self {
        self.with_expectation(BlockProgress::new(min_blocks))
    }

    fn expect_scheduler_drained(self, within_blocks: u64) -> Self {
        self.with_expectation(SchedulerDrained::within_blocks(within_blocks))
    }

    fn expect_event<T>(self, matcher: EventMatcher<T>, min_count: usize) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        if min_count == 0 {
            tracing::warn!(
                category = matcher.category(),
                kind = matcher.kind(),
                "event expectation with a zero minimum always passes"
            );
        }
        self.with_expectation(EventEmitted::new(matcher, min_count))
    }
}
