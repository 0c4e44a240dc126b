use testing_framework_config::constants::DEFAULT_COOLDOWN_BLOCKS;
use tracing::debug;

use super::expectation::Expectation;

/// Expectations to check around a scenario body, plus how many blocks to let
/// pass between the body and evaluation.
pub struct Scenario {
    expectations: Vec<Box<dyn Expectation>>,
    cooldown_blocks: u64,
}

impl Scenario {
    #[must_use]
    pub fn expectations(&self) -> &[Box<dyn Expectation>] {
        &self.expectations
    }

    #[must_use]
    pub fn expectations_mut(&mut self) -> &mut [Box<dyn Expectation>] {
        &mut self.expectations
    }

    #[must_use]
    pub const fn cooldown_blocks(&self) -> u64 {
        self.cooldown_blocks
    }
}

/// Builder used by callers to describe the desired scenario.
pub struct Builder {
    expectations: Vec<Box<dyn Expectation>>,
    cooldown_blocks: u64,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            expectations: Vec::new(),
            cooldown_blocks: DEFAULT_COOLDOWN_BLOCKS,
        }
    }
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_expectation<E>(mut self, expectation: E) -> Self
    where
        E: Expectation + 'static,
    {
        self.expectations.push(Box::new(expectation));
        self
    }

    /// Blocks awaited after the body before expectations evaluate. Zero
    /// evaluates immediately.
    #[must_use]
    pub const fn cooldown_blocks(mut self, blocks: u64) -> Self {
        self.cooldown_blocks = blocks;
        self
    }

    #[must_use]
    pub fn build(self) -> Scenario {
        debug!(
            expectations = self.expectations.len(),
            cooldown_blocks = self.cooldown_blocks,
            "scenario built"
        );
        Scenario {
            expectations: self.expectations,
            cooldown_blocks: self.cooldown_blocks,
        }
    }
}
