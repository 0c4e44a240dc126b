use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt as _;
use tracing::{info, warn};

use super::{DynError, Expectation, Harness, Scenario};
use crate::wait::WaitError;

/// Error returned when running a scenario body or its expectations.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("expectation '{name}' failed to start capturing: {source}")]
    ExpectationCapture {
        name: String,
        #[source]
        source: DynError,
    },
    #[error("scenario body failed: {0}")]
    Body(#[source] DynError),
    #[error("cooldown wait failed: {0}")]
    Cooldown(#[source] WaitError),
    #[error("expectations failed:\n{0}")]
    Expectations(#[source] DynError),
}

impl Scenario {
    /// Starts every expectation's capture, runs `body`, lets the cooldown
    /// blocks pass and then evaluates all expectations, reporting every
    /// failed one together.
    pub async fn run<F, Fut>(&mut self, harness: &Harness, body: F) -> Result<(), ScenarioError>
    where
        F: FnOnce(Harness) -> Fut,
        Fut: Future<Output = Result<(), DynError>>,
    {
        if let Err(err) = prepare_expectations(self.expectations_mut(), harness).await {
            stop_captures(self.expectations_mut());
            return Err(err);
        }

        let outcome = AssertUnwindSafe(body(harness.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(format!("scenario body panicked: {}", panic_message(panic)).into())
            });
        if let Err(source) = outcome {
            stop_captures(self.expectations_mut());
            return Err(ScenarioError::Body(source));
        }

        let cooldown = self.cooldown_blocks();
        if cooldown > 0 {
            if let Err(source) = harness.wait_for_blocks(cooldown - 1).await {
                stop_captures(self.expectations_mut());
                return Err(ScenarioError::Cooldown(source));
            }
        }

        run_expectations(self.expectations_mut(), harness).await
    }
}

fn stop_captures(expectations: &mut [Box<dyn Expectation>]) {
    for expectation in expectations {
        expectation.stop_capture();
    }
    warn!("scenario aborted before evaluation, captures stopped");
}

async fn prepare_expectations(
    expectations: &mut [Box<dyn Expectation>],
    harness: &Harness,
) -> Result<(), ScenarioError> {
    for expectation in expectations {
        if let Err(source) = expectation.start_capture(harness).await {
            return Err(ScenarioError::ExpectationCapture {
                name: expectation.name().to_owned(),
                source,
            });
        }
    }
    Ok(())
}

/// Evaluates every registered expectation, aggregating failures so callers
/// can see all missing conditions in a single report.
async fn run_expectations(
    expectations: &mut [Box<dyn Expectation>],
    harness: &Harness,
) -> Result<(), ScenarioError> {
    let mut failures: Vec<(String, DynError)> = Vec::new();
    for expectation in expectations {
        match expectation.evaluate(harness).await {
            Ok(()) => info!(expectation = expectation.name(), "expectation met"),
            Err(source) => {
                warn!(expectation = expectation.name(), %source, "expectation failed");
                failures.push((expectation.name().to_owned(), source));
            }
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    let summary = failures
        .into_iter()
        .map(|(name, source)| format!("{name}: {source}"))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ScenarioError::Expectations(summary.into()))
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}
