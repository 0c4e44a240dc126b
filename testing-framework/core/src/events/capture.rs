use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::EventMatcher;
use crate::{
    chain::ChainError,
    feed::{BlockStream, SubscriptionHandle},
};

/// Accumulates every event matching a matcher over an open-ended window.
pub struct EventCapture<T> {
    blocks: BlockStream,
    matcher: EventMatcher<T>,
    captured: Arc<Mutex<Vec<T>>>,
    session: Option<SubscriptionHandle>,
}

impl<T> EventCapture<T>
where
    T: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(blocks: BlockStream, matcher: EventMatcher<T>) -> Self {
        Self {
            blocks,
            matcher,
            captured: Arc::new(Mutex::new(Vec::new())),
            session: None,
        }
    }

    #[must_use]
    pub const fn matcher(&self) -> &EventMatcher<T> {
        &self.matcher
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Opens the capture subscription. Does nothing while a session is live;
    /// restarting after [`Self::stop_capture`] keeps what was captured so far.
    pub async fn start_capture(&mut self) -> Result<(), ChainError> {
        if self.is_capturing() {
            return Ok(());
        }

        let mut subscription = self.blocks.subscribe().await?;
        let handle = subscription.handle();
        let session = handle.clone();
        let client = self.blocks.client();
        let matcher = self.matcher.clone();
        let captured = Arc::clone(&self.captured);

        info!(
            category = matcher.category(),
            kind = matcher.kind(),
            subscription = handle.id(),
            "event capture started"
        );

        tokio::spawn(async move {
            while let Some(header) = subscription.next().await {
                let events = match client.events_at(&header.hash).await {
                    Ok(events) => events,
                    Err(err) => {
                        warn!(number = header.number, %err, "event capture: fetching events failed");
                        continue;
                    }
                };

                let mut decoded = Vec::new();
                for event in events.iter().filter(|event| matcher.matches(event)) {
                    match matcher.decode(event) {
                        Ok(record) => decoded.push(record),
                        Err(err) => warn!(number = header.number, %err, "event capture: skipping undecodable event"),
                    }
                }
                if decoded.is_empty() {
                    continue;
                }

                let mut guard = lock(&captured);
                // Checked under the lock so nothing lands after stop_capture.
                if handle.is_closed() {
                    break;
                }
                guard.extend(decoded);
                debug!(
                    number = header.number,
                    total = guard.len(),
                    "event capture appended events"
                );
            }
        });

        self.session = Some(session);
        Ok(())
    }

    /// Releases the capture subscription. Safe to call when never started or
    /// already stopped.
    pub fn stop_capture(&mut self) {
        let Some(handle) = self.session.take() else {
            return;
        };
        let guard = lock(&self.captured);
        if handle.close() {
            info!(
                category = self.matcher.category(),
                kind = self.matcher.kind(),
                captured = guard.len(),
                "event capture stopped"
            );
        }
    }

    /// Snapshot of everything captured so far, in arrival order.
    #[must_use]
    pub fn captured(&self) -> Vec<T> {
        lock(&self.captured).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.captured).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for EventCapture<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.session.take() {
            handle.close();
        }
    }
}

fn lock<T>(captured: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    captured.lock().unwrap_or_else(PoisonError::into_inner)
}
