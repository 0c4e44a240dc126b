use std::sync::Arc;

use async_trait::async_trait;
use testing_framework_core::{
    events::{EventCapture, EventMatcher},
    scenario::{DynError, Expectation, Harness},
};
use thiserror::Error;

type Predicate<T> = dyn Fn(&T) -> bool + Send + Sync;

/// Captures events for the whole run and requires at least `min_count` of
/// them to satisfy a predicate.
pub struct EventEmitted<T> {
    name: String,
    matcher: EventMatcher<T>,
    predicate: Arc<Predicate<T>>,
    min_count: usize,
    capture: Option<EventCapture<T>>,
}

#[derive(Debug, Error)]
enum EventEmittedError {
    #[error("event capture for {event} was never started")]
    NotCaptured { event: String },
    #[error("expected at least {required} matching {event} event(s), observed {matched} of {captured} captured")]
    TooFew {
        event: String,
        required: usize,
        matched: usize,
        captured: usize,
    },
}

impl<T> EventEmitted<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(matcher: EventMatcher<T>, min_count: usize) -> Self {
        let name = format!("event_emitted({}.{})", matcher.category(), matcher.kind());
        Self {
            name,
            matcher,
            predicate: Arc::new(|_: &T| true),
            min_count,
            capture: None,
        }
    }

    /// Only events for which `predicate` holds count towards the minimum.
    #[must_use]
    pub fn matching(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    fn event(&self) -> String {
        format!("{}.{}", self.matcher.category(), self.matcher.kind())
    }
}

#[async_trait]
impl<T> Expectation for EventEmitted<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_capture(&mut self, harness: &Harness) -> Result<(), DynError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let capture = harness.capture_events(self.matcher.clone()).await?;
        tracing::info!(event = %self.event(), min_count = self.min_count, "event capture started");
        self.capture = Some(capture);
        Ok(())
    }

    async fn evaluate(&mut self, _harness: &Harness) -> Result<(), DynError> {
        let event = self.event();
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| EventEmittedError::NotCaptured {
                event: event.clone(),
            })?;
        capture.stop_capture();

        let captured = capture.captured();
        let matched = captured.iter().filter(|item| (self.predicate)(item)).count();
        if matched < self.min_count {
            tracing::warn!(%event, matched, required = self.min_count, "too few events observed");
            return Err(EventEmittedError::TooFew {
                event,
                required: self.min_count,
                matched,
                captured: captured.len(),
            }
            .into());
        }

        tracing::info!(%event, matched, "event expectation satisfied");
        Ok(())
    }

    fn stop_capture(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.stop_capture();
        }
    }
}
