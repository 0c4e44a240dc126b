use async_trait::async_trait;

use super::{DynError, Harness};

#[async_trait]
/// Defines a check evaluated after a scenario body has run.
pub trait Expectation: Send + Sync {
    fn name(&self) -> &str;

    /// Called before the scenario body starts, e.g. to open event captures.
    async fn start_capture(&mut self, _harness: &Harness) -> Result<(), DynError> {
        Ok(())
    }

    async fn evaluate(&mut self, harness: &Harness) -> Result<(), DynError>;

    /// Releases whatever `start_capture` opened when the run ends before
    /// evaluation. Must be idempotent.
    fn stop_capture(&mut self) {}
}
