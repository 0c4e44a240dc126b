//! Block-synchronised waits: every wait subscribes to new headers, checks
//! each one, and releases its subscription on every exit path.

mod engine;
pub mod race;

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
pub use engine::WaitEngine;
pub use race::{RaceError, race_with_timeout};
use thiserror::Error;

use crate::{
    chain::{BlockHeader, ChainError},
    events::DecodeError,
};

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("{message}: {remaining} block(s) remaining after {after:?}")]
    Timeout {
        message: String,
        remaining: u64,
        after: Duration,
    },
    #[error("no {category}.{kind} event matched within {blocks} block(s)")]
    NotFound {
        category: String,
        kind: String,
        blocks: u64,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("block subscription ended before the wait resolved")]
    SubscriptionClosed,
    #[error("wait task failed: {0}")]
    Task(String),
}

impl WaitError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Verdict of a watch on one header.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    Continue,
    Done(T),
}

/// Per-header check driven by [`WaitEngine::watch`].
#[async_trait]
pub trait HeaderWatch: Send + 'static {
    type Output: Send + 'static;

    /// Human readable description used in timeout errors.
    fn describe(&self) -> String;

    async fn on_header(&mut self, header: &BlockHeader) -> Result<Step<Self::Output>, WaitError>;
}

/// Remaining-count shared between a running watch and the engine, so timeouts
/// can report how far the wait got.
#[derive(Clone, Debug, Default)]
pub struct Progress(Arc<AtomicU64>);

impl Progress {
    #[must_use]
    pub fn new(remaining: u64) -> Self {
        Self(Arc::new(AtomicU64::new(remaining)))
    }

    pub fn set(&self, remaining: u64) {
        self.0.store(remaining, Ordering::Release);
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}
