//! Cancelable block-header subscriptions, the only source of temporal
//! progress in the harness.

mod subscription;

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

pub use subscription::{Subscription, SubscriptionGuard, SubscriptionHandle};
use tracing::debug;

use crate::chain::{BlockHeader, ChainClient, ChainError};

/// Opens header subscriptions against a chain client and keeps count of the
/// ones still live.
#[derive(Clone)]
pub struct BlockStream {
    client: Arc<dyn ChainClient>,
    open: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl BlockStream {
    #[must_use]
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            open: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&self.client)
    }

    /// Subscribes to headers produced from now on. The subscription is
    /// released when closed through its handle, when the backend feed ends,
    /// or when it is dropped.
    pub async fn subscribe(&self) -> Result<Subscription<BlockHeader>, ChainError> {
        let raw = self.client.subscribe_new_headers().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscription = id, "block subscription opened");
        Ok(Subscription::new(id, raw, Arc::clone(&self.open)))
    }

    /// Callback form of [`Self::subscribe`]. Delivery runs on a spawned task;
    /// the callback may close the handle it is given, after which no further
    /// header is delivered.
    pub async fn subscribe_with<F>(&self, mut on_header: F) -> Result<SubscriptionHandle, ChainError>
    where
        F: FnMut(&BlockHeader, &SubscriptionHandle) + Send + 'static,
    {
        let mut subscription = self.subscribe().await?;
        let handle = subscription.handle();
        let delivery_handle = handle.clone();

        tokio::spawn(async move {
            while let Some(header) = subscription.next().await {
                on_header(&header, &delivery_handle);
                if delivery_handle.is_closed() {
                    break;
                }
            }
        });

        Ok(handle)
    }

    /// Subscriptions opened through this stream that are not yet released.
    #[must_use]
    pub fn open_subscriptions(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}
