use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type BlockNumber = u64;
pub type Balance = u128;
pub type Nonce = u64;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Header of a produced block. Numbers usually increase, but instant-seal
/// backends may report the same number twice in a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

/// An event emitted while a block was applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub category: String,
    pub kind: String,
    pub payload: Vec<Value>,
}

impl EventRecord {
    #[must_use]
    pub fn new(category: impl Into<String>, kind: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            category: category.into(),
            kind: kind.into(),
            payload,
        }
    }

    #[must_use]
    pub fn is(&self, category: &str, kind: &str) -> bool {
        self.category == category && self.kind == kind
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Argument of a constructed call. Calls nest so wrappers such as the
/// scheduler can carry the operation they dispatch later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallArg {
    Value(Value),
    Call(Box<Call>),
    Null,
}

impl CallArg {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_call(&self) -> Option<&Call> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Call> for CallArg {
    fn from(call: Call) -> Self {
        Self::Call(Box::new(call))
    }
}

impl<T: Into<CallArg>> From<Option<T>> for CallArg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A call descriptor ready to be signed and submitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub section: String,
    pub method: String,
    pub args: Vec<CallArg>,
}

impl Call {
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.section, self.method)
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&CallArg> {
        self.args.get(index)
    }
}

/// Why an included operation failed to apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchFailure {
    /// Qualified error name, e.g. `scheduler.FailedToSchedule`.
    pub name: String,
    pub detail: Option<String>,
}

impl DispatchFailure {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Outcome of a submitted operation once it was included in a block.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub block: BlockHeader,
    pub failure: Option<DispatchFailure>,
    pub events: Vec<EventRecord>,
}

impl Settlement {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}
