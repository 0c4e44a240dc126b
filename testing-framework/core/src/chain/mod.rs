//! Collaborators the harness consumes but never implements itself: reading
//! chain state, submitting signed operations, signing identities and call
//! construction.

pub mod paths;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};
pub use types::{
    AccountId, Balance, BlockHash, BlockHeader, BlockNumber, Call, CallArg, DispatchFailure,
    EventRecord, Nonce, Settlement,
};

use crate::scenario::DynError;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("state query {path} failed: {reason}")]
    Query { path: String, reason: String },
    #[error("unexpected value at {path}: {value}")]
    UnexpectedValue { path: String, value: Value },
    #[error("submission of {call} rejected: {reason}")]
    Rejected { call: String, reason: String },
    #[error("submission of {call} was dropped before settlement")]
    Dropped { call: String },
    #[error("block {0} is unknown to the backend")]
    UnknownBlock(BlockHash),
    #[error("signing failed: {0}")]
    Signing(#[source] DynError),
}

/// A live backend feed plus the callback that releases it.
pub struct RawSubscription<T> {
    pub items: BoxStream<'static, T>,
    pub unsubscribe: Box<dyn FnOnce() + Send>,
}

impl<T> RawSubscription<T> {
    pub fn new(items: BoxStream<'static, T>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            items,
            unsubscribe: Box::new(unsubscribe),
        }
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Opens a feed of headers produced from now on.
    async fn subscribe_new_headers(&self) -> Result<RawSubscription<BlockHeader>, ChainError>;

    /// Events applied in the given block, in emission order.
    async fn events_at(&self, block: &BlockHash) -> Result<Vec<EventRecord>, ChainError>;

    async fn query_state(&self, path: &str, args: &[Value]) -> Result<Value, ChainError>;
}

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Signs and submits `call`, resolving once it settled in a block. A
    /// `None` nonce lets the backend pick the sender's next one.
    async fn submit(
        &self,
        signer: &dyn Signer,
        call: Call,
        nonce: Option<Nonce>,
    ) -> Result<Settlement, ChainError>;
}

/// Signing capability bound to a stable address.
pub trait Signer: Send + Sync {
    fn address(&self) -> &AccountId;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, DynError>;
}

/// Source of fresh identities.
pub trait Keyring: Send + Sync {
    fn generate(&self) -> Arc<dyn Signer>;
}

pub trait CallBuilder: Send + Sync {
    fn build_call(&self, section: &str, method: &str, args: Vec<CallArg>)
    -> Result<Call, DynError>;
}

/// Builds calls verbatim without validating them against any metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainCallBuilder;

impl CallBuilder for PlainCallBuilder {
    fn build_call(
        &self,
        section: &str,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<Call, DynError> {
        if section.is_empty() || method.is_empty() {
            return Err(format!("invalid call name '{section}.{method}'").into());
        }
        Ok(Call {
            section: section.to_owned(),
            method: method.to_owned(),
            args,
        })
    }
}

pub async fn free_balance(
    client: &dyn ChainClient,
    account: &AccountId,
) -> Result<Balance, ChainError> {
    let value = client
        .query_state(paths::BALANCES_FREE, &[json!(account.as_str())])
        .await?;
    balance_from_value(paths::BALANCES_FREE, value)
}

pub async fn account_nonce(
    client: &dyn ChainClient,
    account: &AccountId,
) -> Result<Nonce, ChainError> {
    let value = client
        .query_state(paths::SYSTEM_ACCOUNT_NONCE, &[json!(account.as_str())])
        .await?;
    value
        .as_u64()
        .ok_or_else(|| ChainError::UnexpectedValue {
            path: paths::SYSTEM_ACCOUNT_NONCE.to_owned(),
            value,
        })
}

/// Number of scheduled tasks still waiting to fire.
pub async fn agenda_len(client: &dyn ChainClient) -> Result<usize, ChainError> {
    let value = client.query_state(paths::SCHEDULER_AGENDA, &[]).await?;
    match value {
        Value::Array(entries) => Ok(entries.len()),
        Value::Null => Ok(0),
        other => Err(ChainError::UnexpectedValue {
            path: paths::SCHEDULER_AGENDA.to_owned(),
            value: other,
        }),
    }
}

/// Balances exceed `u64`, so backends may report them as decimal strings.
pub fn balance_from_value(path: &str, value: Value) -> Result<Balance, ChainError> {
    let parsed = match &value {
        Value::Number(number) => number.as_u64().map(Balance::from),
        Value::String(raw) => raw.parse::<Balance>().ok(),
        Value::Null => Some(0),
        _ => None,
    };
    parsed.ok_or_else(|| ChainError::UnexpectedValue {
        path: path.to_owned(),
        value,
    })
}
