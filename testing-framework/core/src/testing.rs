//! In-memory chain double for unit tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures::StreamExt as _;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    chain::{
        AccountId, BlockHash, BlockHeader, Call, ChainClient, ChainError, DispatchFailure,
        EventRecord, Keyring, Nonce, RawSubscription, Settlement, Signer, Submitter,
    },
    scenario::DynError,
};

pub struct TestSigner(pub AccountId);

impl TestSigner {
    pub fn new(address: &str) -> Self {
        Self(address.into())
    }
}

impl Signer for TestSigner {
    fn address(&self) -> &AccountId {
        &self.0
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, DynError> {
        Ok(message.to_vec())
    }
}

#[derive(Default)]
pub struct TestKeyring {
    next: AtomicU64,
}

impl Keyring for TestKeyring {
    fn generate(&self) -> Arc<dyn Signer> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        Arc::new(TestSigner(AccountId(format!("test-{index}"))))
    }
}

#[derive(Default)]
struct Inner {
    next_subscriber: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<BlockHeader>)>,
    height: u64,
    events: HashMap<BlockHash, Vec<EventRecord>>,
    state: HashMap<String, Value>,
    submitted: Vec<(Call, Option<Nonce>)>,
    failures: HashMap<String, DispatchFailure>,
}

#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<Inner>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Arc<dyn ChainClient> {
        Arc::new(self.clone())
    }

    pub fn submitter(&self) -> Arc<dyn Submitter> {
        Arc::new(self.clone())
    }

    pub fn produce_block(&self, events: Vec<EventRecord>) -> BlockHeader {
        let mut inner = self.inner.lock().unwrap();
        inner.height += 1;
        let header = BlockHeader {
            number: inner.height,
            hash: hash_for(inner.height),
        };
        inner.events.insert(header.hash, events);
        inner
            .subscribers
            .retain(|(_, sender)| sender.send(header).is_ok());
        header
    }

    /// Re-announces the current head, as instant-seal backends sometimes do.
    pub fn repeat_head(&self) -> BlockHeader {
        let mut inner = self.inner.lock().unwrap();
        let header = BlockHeader {
            number: inner.height,
            hash: hash_for(inner.height),
        };
        inner.events.entry(header.hash).or_default();
        inner
            .subscribers
            .retain(|(_, sender)| sender.send(header).is_ok());
        header
    }

    pub fn live_subscribers(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    pub fn set_state(&self, path: &str, value: Value) {
        self.inner
            .lock()
            .unwrap()
            .state
            .insert(path.to_owned(), value);
    }

    pub fn fail_method(&self, method: &str, failure: DispatchFailure) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(method.to_owned(), failure);
    }

    pub fn submitted(&self) -> Vec<(Call, Option<Nonce>)> {
        self.inner.lock().unwrap().submitted.clone()
    }

    /// Yields until `count` subscribers are attached.
    pub async fn wait_for_subscribers(&self, count: usize) {
        while self.live_subscribers() < count {
            tokio::task::yield_now().await;
        }
    }
}

fn hash_for(number: u64) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&number.to_be_bytes());
    BlockHash(bytes)
}

#[async_trait]
impl ChainClient for MockChain {
    async fn subscribe_new_headers(&self) -> Result<RawSubscription<BlockHeader>, ChainError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner.subscribers.push((id, sender));
            id
        };
        let items = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|header| (header, receiver))
        })
        .boxed();
        let inner = Arc::clone(&self.inner);
        Ok(RawSubscription::new(items, move || {
            inner
                .lock()
                .unwrap()
                .subscribers
                .retain(|(existing, _)| *existing != id);
        }))
    }

    async fn events_at(&self, block: &BlockHash) -> Result<Vec<EventRecord>, ChainError> {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(block)
            .cloned()
            .ok_or(ChainError::UnknownBlock(*block))
    }

    async fn query_state(&self, path: &str, _args: &[Value]) -> Result<Value, ChainError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .state
            .get(path)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Submitter for MockChain {
    async fn submit(
        &self,
        _signer: &dyn Signer,
        call: Call,
        nonce: Option<Nonce>,
    ) -> Result<Settlement, ChainError> {
        let failure = {
            let mut inner = self.inner.lock().unwrap();
            inner.submitted.push((call.clone(), nonce));
            inner.failures.get(&call.method).cloned()
        };
        let block = self.produce_block(Vec::new());
        Ok(Settlement {
            block,
            failure,
            events: Vec::new(),
        })
    }
}
