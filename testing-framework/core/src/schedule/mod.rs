//! Delayed and periodic operations wrapped for the backend scheduler.

mod builder;
mod scheduler;

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use builder::ScheduledCallBuilder;
use rand::Rng as _;
pub use scheduler::{ScheduleReceipt, Scheduler, TaskAddress};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    chain::{BlockNumber, ChainError, DispatchFailure},
    scenario::DynError,
};

const SCHEDULE_ID_LEN: usize = 32;
const ALLOCATOR_PREFIX_LEN: usize = SCHEDULE_ID_LEN - size_of::<u64>();

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule id {id} is already in use")]
    Collision { id: ScheduleId },
    #[error("{call} rejected by the backend: {failure}")]
    BackendRejected {
        call: String,
        failure: DispatchFailure,
    },
    #[error("schedule label is {len} bytes, at most {SCHEDULE_ID_LEN} fit")]
    LabelTooLong { len: usize },
    #[error("periodic schedule needs a non-zero period and repetition count")]
    InvalidPeriodic,
    #[error("building the scheduler call failed: {0}")]
    Build(#[source] DynError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Key reserving a named scheduling slot until it fires or is canceled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(pub [u8; SCHEDULE_ID_LEN]);

impl ScheduleId {
    /// Zero-padded id spelling `label`.
    pub fn from_label(label: &str) -> Result<Self, ScheduleError> {
        let bytes = label.as_bytes();
        if bytes.len() > SCHEDULE_ID_LEN {
            return Err(ScheduleError::LabelTooLong { len: bytes.len() });
        }
        let mut id = [0u8; SCHEDULE_ID_LEN];
        id[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(id))
    }

    #[must_use]
    pub fn from_counter(prefix: &[u8; ALLOCATOR_PREFIX_LEN], counter: u64) -> Self {
        let mut id = [0u8; SCHEDULE_ID_LEN];
        id[..ALLOCATOR_PREFIX_LEN].copy_from_slice(prefix);
        id[ALLOCATOR_PREFIX_LEN..].copy_from_slice(&counter.to_be_bytes());
        Self(id)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduleId({self})")
    }
}

/// Hands out distinct ids: a per-allocator prefix followed by a monotonic
/// counter. Clones share the counter.
#[derive(Clone, Debug)]
pub struct ScheduleIdAllocator {
    prefix: [u8; ALLOCATOR_PREFIX_LEN],
    counter: Arc<AtomicU64>,
}

impl ScheduleIdAllocator {
    /// Allocator with a random prefix, so separate runs against the same
    /// backend do not collide.
    #[must_use]
    pub fn random() -> Self {
        Self::with_prefix(rand::thread_rng().r#gen())
    }

    #[must_use]
    pub fn with_prefix(prefix: [u8; ALLOCATOR_PREFIX_LEN]) -> Self {
        Self {
            prefix,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_id(&self) -> ScheduleId {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        ScheduleId::from_counter(&self.prefix, counter)
    }
}

impl Default for ScheduleIdAllocator {
    fn default() -> Self {
        Self::random()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleWhen {
    /// Absolute block number.
    At(BlockNumber),
    /// Offset from the block the schedule call is applied in.
    After(u64),
}

impl ScheduleWhen {
    const fn block(self) -> u64 {
        match self {
            Self::At(block) | Self::After(block) => block,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Periodic {
    pub period: u32,
    pub repetitions: u32,
}

impl Periodic {
    #[must_use]
    pub const fn new(period: u32, repetitions: u32) -> Self {
        Self {
            period,
            repetitions,
        }
    }

    fn to_value(self) -> Result<Value, ScheduleError> {
        if self.period == 0 || self.repetitions == 0 {
            return Err(ScheduleError::InvalidPeriodic);
        }
        Ok(json!([self.period, self.repetitions]))
    }
}

/// When and how a wrapped operation should fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledOperationSpec {
    pub when: ScheduleWhen,
    pub periodic: Option<Periodic>,
    pub priority: Option<u8>,
    pub id: Option<ScheduleId>,
}

impl ScheduledOperationSpec {
    #[must_use]
    pub const fn at(block: BlockNumber) -> Self {
        Self::new(ScheduleWhen::At(block))
    }

    #[must_use]
    pub const fn after(offset: u64) -> Self {
        Self::new(ScheduleWhen::After(offset))
    }

    const fn new(when: ScheduleWhen) -> Self {
        Self {
            when,
            periodic: None,
            priority: None,
            id: None,
        }
    }

    #[must_use]
    pub const fn periodic(mut self, period: u32, repetitions: u32) -> Self {
        self.periodic = Some(Periodic::new(period, repetitions));
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn named(mut self, id: ScheduleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub const fn is_named(&self) -> bool {
        self.id.is_some()
    }
}
