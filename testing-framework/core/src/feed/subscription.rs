use std::{
    fmt,
    pin::pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::{StreamExt as _, stream::BoxStream};
use tokio::sync::Notify;
use tracing::debug;

use crate::chain::RawSubscription;

struct SubscriptionState {
    id: u64,
    closed: AtomicBool,
    wake: Notify,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    open: Arc<AtomicUsize>,
}

/// Cloneable handle that can release a subscription from anywhere, including
/// from inside the loop consuming it.
#[derive(Clone)]
pub struct SubscriptionHandle {
    state: Arc<SubscriptionState>,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Releases the backend subscription. Returns `true` only for the call
    /// that actually closed it; later calls are no-ops.
    pub fn close(&self) -> bool {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let release = self
            .state
            .release
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }

        self.state.open.fetch_sub(1, Ordering::AcqRel);
        self.state.wake.notify_waiters();
        debug!(subscription = self.state.id, "subscription closed");
        true
    }

    /// Ties the subscription's lifetime to the returned guard.
    #[must_use]
    pub fn close_on_drop(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: self }
    }

    /// Resolves once the subscription has been closed.
    pub async fn closed(&self) {
        loop {
            let mut notified = pin!(self.state.wake.notified());
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.state.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes its subscription when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    handle: SubscriptionHandle,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// A live feed of items that yields nothing once its handle is closed.
pub struct Subscription<T> {
    items: BoxStream<'static, T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: u64, raw: RawSubscription<T>, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::AcqRel);
        let state = SubscriptionState {
            id,
            closed: AtomicBool::new(false),
            wake: Notify::new(),
            release: Mutex::new(Some(raw.unsubscribe)),
            open,
        };
        Self {
            items: raw.items,
            handle: SubscriptionHandle {
                state: Arc::new(state),
            },
        }
    }

    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Next item in arrival order, or `None` once the subscription is closed
    /// or the backend feed has ended.
    pub async fn next(&mut self) -> Option<T> {
        let mut notified = pin!(self.handle.state.wake.notified());
        notified.as_mut().enable();
        if self.handle.is_closed() {
            return None;
        }

        let item = tokio::select! {
            biased;
            () = &mut notified => None,
            item = self.items.next() => {
                if item.is_none() {
                    self.handle.close();
                }
                item
            }
        };

        // The handle may have been closed while the item was in flight.
        if self.handle.is_closed() {
            return None;
        }
        item
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.close();
    }
}
