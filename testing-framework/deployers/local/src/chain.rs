use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt as _;
use rand::Rng as _;
use serde_json::{Value, json};
use testing_framework_core::{
    chain::{
        AccountId, Balance, BlockHash, BlockHeader, BlockNumber, Call, CallArg, CallBuilder,
        ChainClient, ChainError, EventRecord, Nonce, RawSubscription,
        Settlement, Signer, Submitter, paths,
    },
    scenario::DynError,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::{LocalChainConfig, Sealing},
    ledger::{Ledger, SUPPORTED_CALLS},
};

type SettlementSender = oneshot::Sender<Result<Settlement, ChainError>>;

struct PooledExtrinsic {
    call: Call,
    settled: SettlementSender,
}

struct ChainState {
    ledger: Ledger,
    head: BlockHeader,
    events: HashMap<BlockHash, Vec<EventRecord>>,
    pool: BTreeMap<(AccountId, Nonce), PooledExtrinsic>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<BlockHeader>)>,
    next_subscriber: u64,
}

/// In-process ledger: balances, nonces, a scheduler agenda and an extrinsic
/// pool sealed into blocks on demand or on an interval. Cheap to clone.
#[derive(Clone)]
pub struct LocalChain {
    state: Arc<Mutex<ChainState>>,
    block_capacity: usize,
}

impl LocalChain {
    /// Builds the chain at genesis. Interval sealing is not started here; see
    /// [`Self::start_sealing`].
    #[must_use]
    pub fn new(config: &LocalChainConfig) -> Self {
        let genesis = BlockHeader {
            number: 0,
            hash: random_hash(),
        };
        let state = ChainState {
            ledger: Ledger::with_endowments(&config.endowments),
            head: genesis,
            events: HashMap::from([(genesis.hash, Vec::new())]),
            pool: BTreeMap::new(),
            subscribers: Vec::new(),
            next_subscriber: 0,
        };
        info!(
            endowed = config.endowments.len(),
            capacity = config.block_capacity,
            "local chain at genesis"
        );
        Self {
            state: Arc::new(Mutex::new(state)),
            block_capacity: config.block_capacity.max(1),
        }
    }

    /// Starts a chain and, for interval sealing, its block producer.
    #[must_use]
    pub fn start(config: &LocalChainConfig) -> (Self, Option<Sealer>) {
        let chain = Self::new(config);
        let sealer = match config.sealing {
            Sealing::Manual => None,
            Sealing::Interval(every) => Some(chain.start_sealing(every)),
        };
        (chain, sealer)
    }

    /// Seals a block every `every` until the returned [`Sealer`] is dropped.
    #[must_use]
    pub fn start_sealing(&self, every: Duration) -> Sealer {
        let chain = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                chain.seal_block();
            }
        });
        info!(interval = ?every, "interval sealing started");
        Sealer { task }
    }

    #[must_use]
    pub fn head(&self) -> BlockHeader {
        self.lock().head
    }

    #[must_use]
    pub fn free_balance(&self, account: &AccountId) -> Balance {
        self.lock().ledger.free_balance(account)
    }

    #[must_use]
    pub fn nonce(&self, account: &AccountId) -> Nonce {
        self.lock().ledger.nonce(account)
    }

    #[must_use]
    pub fn pending_extrinsics(&self) -> usize {
        self.lock().pool.len()
    }

    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Makes the next `count` transfer dispatches fail. Their nonces are
    /// still consumed.
    pub fn fail_next_transfers(&self, count: usize) {
        self.lock().ledger.fail_next_transfers(count);
    }

    /// Produces one block: due scheduler tasks first, then pooled extrinsics
    /// in (sender, nonce) order up to the block capacity.
    pub fn seal_block(&self) -> BlockHeader {
        let mut state = self.lock();
        let number = state.head.number + 1;
        let header = BlockHeader {
            number,
            hash: random_hash(),
        };
        state.ledger.height = number;

        let mut events = run_agenda(&mut state.ledger, number);
        let (included, dropped) = select_extrinsics(&mut state, self.block_capacity);

        let mut settlements = Vec::with_capacity(included.len());
        for (sender, extrinsic) in included {
            state.ledger.bump_nonce(&sender);
            let (failure, applied) = match state.ledger.dispatch(&sender, &extrinsic.call) {
                Ok(mut applied) => {
                    applied.push(EventRecord::new("system", "ExtrinsicSuccess", Vec::new()));
                    (None, applied)
                }
                Err(failure) => {
                    debug!(call = %extrinsic.call.name(), %failure, "extrinsic failed");
                    let event = EventRecord::new(
                        "system",
                        "ExtrinsicFailed",
                        vec![json!(failure.name), json!(sender.as_str())],
                    );
                    (Some(failure), vec![event])
                }
            };
            events.extend(applied.iter().cloned());
            settlements.push((
                extrinsic.settled,
                Settlement {
                    block: header,
                    failure,
                    events: applied,
                },
            ));
        }

        state.events.insert(header.hash, events);
        state.head = header;
        state
            .subscribers
            .retain(|(_, subscriber)| subscriber.send(header).is_ok());
        let remaining = state.pool.len();
        drop(state);

        debug!(
            number,
            included = settlements.len(),
            dropped = dropped.len(),
            remaining,
            "block sealed"
        );
        for (settled, settlement) in settlements {
            let _ = settled.send(Ok(settlement));
        }
        for ((sender, nonce), extrinsic) in dropped {
            warn!(%sender, nonce, call = %extrinsic.call.name(), "future nonce dropped");
            let _ = extrinsic.settled.send(Err(ChainError::Dropped {
                call: extrinsic.call.name(),
            }));
        }
        header
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background block producer; stops when dropped.
pub struct Sealer {
    task: JoinHandle<()>,
}

impl Sealer {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Sealer {
    fn drop(&mut self) {
        self.task.abort();
        debug!("interval sealing stopped");
    }
}

fn run_agenda(ledger: &mut Ledger, now: BlockNumber) -> Vec<EventRecord> {
    let mut events = Vec::new();
    for (index, task) in ledger.agenda.take_due(now) {
        let result = match ledger.dispatch(&task.origin, &task.call) {
            Ok(applied) => {
                events.extend(applied);
                json!("ok")
            }
            Err(failure) => json!({ "err": failure.name }),
        };
        events.push(EventRecord::new(
            paths::SCHEDULER_SECTION,
            "Dispatched",
            vec![json!([now, index]), task.id_value(), result],
        ));
        ledger.agenda.reschedule(now, task);
    }
    events
}

type Selected = (
    Vec<(AccountId, PooledExtrinsic)>,
    Vec<((AccountId, Nonce), PooledExtrinsic)>,
);

/// Picks the extrinsics whose nonce continues their sender's sequence, up to
/// `capacity`. Extrinsics leaving a nonce gap are dropped.
fn select_extrinsics(state: &mut ChainState, capacity: usize) -> Selected {
    let mut included = Vec::new();
    let mut dropped = Vec::new();
    let mut expected: HashMap<AccountId, Nonce> = HashMap::new();

    let keys: Vec<(AccountId, Nonce)> = state.pool.keys().cloned().collect();
    for key in keys {
        let (sender, nonce) = &key;
        let next = *expected
            .entry(sender.clone())
            .or_insert_with(|| state.ledger.nonce(sender));
        if *nonce == next {
            if included.len() >= capacity {
                break;
            }
            if let Some(extrinsic) = state.pool.remove(&key) {
                expected.insert(sender.clone(), next + 1);
                included.push((sender.clone(), extrinsic));
            }
        } else if let Some(extrinsic) = state.pool.remove(&key) {
            dropped.push((key, extrinsic));
        }
    }
    (included, dropped)
}

fn random_hash() -> BlockHash {
    BlockHash(rand::thread_rng().r#gen())
}

#[async_trait]
impl ChainClient for LocalChain {
    async fn subscribe_new_headers(&self) -> Result<RawSubscription<BlockHeader>, ChainError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.push((id, sender));
            id
        };
        let items = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|header| (header, receiver))
        })
        .boxed();

        let chain = self.clone();
        Ok(RawSubscription::new(items, move || {
            chain
                .lock()
                .subscribers
                .retain(|(existing, _)| *existing != id);
        }))
    }

    async fn events_at(&self, block: &BlockHash) -> Result<Vec<EventRecord>, ChainError> {
        self.lock()
            .events
            .get(block)
            .cloned()
            .ok_or(ChainError::UnknownBlock(*block))
    }

    async fn query_state(&self, path: &str, args: &[Value]) -> Result<Value, ChainError> {
        let state = self.lock();
        let account = || {
            args.first()
                .and_then(Value::as_str)
                .map(AccountId::from)
                .ok_or_else(|| ChainError::Query {
                    path: path.to_owned(),
                    reason: "expected an account argument".to_owned(),
                })
        };

        match path {
            paths::BALANCES_FREE => Ok(json!(state.ledger.free_balance(&account()?).to_string())),
            paths::SYSTEM_ACCOUNT_NONCE => Ok(json!(state.ledger.nonce(&account()?))),
            paths::SCHEDULER_AGENDA => Ok(Value::Array(state.ledger.agenda.pending())),
            paths::SCHEDULER_LOOKUP => {
                let id = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(state
                    .ledger
                    .agenda
                    .lookup(id)
                    .map_or(Value::Null, |(when, index)| json!([when, index])))
            }
            "system.number" => Ok(json!(state.head.number)),
            _ => Err(ChainError::Query {
                path: path.to_owned(),
                reason: "unknown state path".to_owned(),
            }),
        }
    }
}

#[async_trait]
impl Submitter for LocalChain {
    async fn submit(
        &self,
        signer: &dyn Signer,
        call: Call,
        nonce: Option<Nonce>,
    ) -> Result<Settlement, ChainError> {
        let sender = signer.address().clone();
        let name = call.name();
        let encoded = serde_json::to_vec(&call).map_err(|err| ChainError::Rejected {
            call: name.clone(),
            reason: err.to_string(),
        })?;
        signer.sign(&encoded).map_err(ChainError::Signing)?;

        let (settled, receiver) = oneshot::channel();
        {
            let mut state = self.lock();
            let onchain = state.ledger.nonce(&sender);
            let nonce = nonce.unwrap_or_else(|| next_free_nonce(&state, &sender, onchain));
            if nonce < onchain {
                return Err(ChainError::Rejected {
                    call: name,
                    reason: format!("stale nonce {nonce}, account is at {onchain}"),
                });
            }
            let key = (sender.clone(), nonce);
            if state.pool.contains_key(&key) {
                return Err(ChainError::Rejected {
                    call: name,
                    reason: format!("nonce {nonce} already pooled for {sender}"),
                });
            }
            debug!(%sender, nonce, call = %name, "extrinsic pooled");
            state.pool.insert(key, PooledExtrinsic { call, settled });
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(ChainError::Dropped { call: name }))
    }
}

fn next_free_nonce(state: &ChainState, sender: &AccountId, onchain: Nonce) -> Nonce {
    state
        .pool
        .range((sender.clone(), onchain)..=(sender.clone(), Nonce::MAX))
        .map(|((_, nonce), _)| nonce + 1)
        .last()
        .unwrap_or(onchain)
}

/// Validates call names against what the local ledger dispatches.
impl CallBuilder for LocalChain {
    fn build_call(
        &self,
        section: &str,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<Call, DynError> {
        let call = Call {
            section: section.to_owned(),
            method: method.to_owned(),
            args,
        };
        if !SUPPORTED_CALLS.contains(&call.name().as_str()) {
            return Err(format!("call '{}' is not supported by the local chain", call.name()).into());
        }
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::DevSigner;

    fn transfer(chain: &LocalChain, to: &str, amount: Balance) -> Call {
        chain
            .build_call(
                "balances",
                "transfer",
                vec![json!(to).into(), json!(amount.to_string()).into()],
            )
            .unwrap()
    }

    #[tokio::test]
    async fn manual_sealing_settles_pooled_transfers() {
        let chain = LocalChain::new(&LocalChainConfig::manual());
        let alice = DevSigner::dev("alice");
        let call = transfer(&chain, "newcomer", 25);

        let submitter = chain.clone();
        let pending = tokio::spawn(async move { submitter.submit(&alice, call, None).await });
        while chain.pending_extrinsics() == 0 {
            tokio::task::yield_now().await;
        }

        let header = chain.seal_block();
        let settlement = pending.await.unwrap().unwrap();
        assert_eq!(settlement.block, header);
        assert!(settlement.is_success());
        assert!(settlement.events[0].is("balances", "Transfer"));
        assert_eq!(chain.free_balance(&"newcomer".into()), 25);
        assert_eq!(chain.nonce(&"alice".into()), 1);
    }

    #[tokio::test]
    async fn stale_nonces_are_rejected_immediately() {
        let chain = LocalChain::new(&LocalChainConfig::manual());
        let alice = DevSigner::dev("alice");
        {
            let mut state = chain.lock();
            state.ledger.bump_nonce(&"alice".into());
        }

        let err = chain
            .submit(&alice, transfer(&chain, "bob", 1), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected { .. }));
    }

    #[tokio::test]
    async fn nonce_gaps_are_dropped_at_sealing() {
        let chain = LocalChain::new(&LocalChainConfig::manual());
        let call = transfer(&chain, "bob", 1);

        let submitter = chain.clone();
        let pending = tokio::spawn(async move {
            submitter
                .submit(&DevSigner::dev("alice"), call, Some(3))
                .await
        });
        while chain.pending_extrinsics() == 0 {
            tokio::task::yield_now().await;
        }
        chain.seal_block();

        assert!(matches!(
            pending.await.unwrap(),
            Err(ChainError::Dropped { .. })
        ));
        assert_eq!(chain.pending_extrinsics(), 0);
    }

    #[tokio::test]
    async fn block_capacity_defers_the_overflow() {
        let chain = LocalChain::new(&LocalChainConfig::manual().with_block_capacity(2));
        let mut pending = Vec::new();
        for nonce in 0..3 {
            let submitter = chain.clone();
            let call = transfer(&chain, "newcomer", 1);
            pending.push(tokio::spawn(async move {
                submitter
                    .submit(&DevSigner::dev("alice"), call, Some(nonce))
                    .await
            }));
        }
        while chain.pending_extrinsics() < 3 {
            tokio::task::yield_now().await;
        }

        chain.seal_block();
        assert_eq!(chain.pending_extrinsics(), 1);
        chain.seal_block();

        for task in pending {
            assert!(task.await.unwrap().unwrap().is_success());
        }
        assert_eq!(chain.free_balance(&"newcomer".into()), 3);
    }

    #[test]
    fn builder_rejects_calls_the_ledger_cannot_dispatch() {
        let chain = LocalChain::new(&LocalChainConfig::manual());
        assert!(chain.build_call("democracy", "propose", vec![]).is_err());
        assert!(chain.build_call("dev", "emit", vec![]).is_ok());
    }

    #[tokio::test]
    async fn unknown_state_paths_are_query_errors() {
        let chain = LocalChain::new(&LocalChainConfig::manual());
        assert!(matches!(
            chain.query_state("democracy.referendumCount", &[]).await,
            Err(ChainError::Query { .. })
        ));
        assert_eq!(
            chain
                .query_state(paths::BALANCES_FREE, &[json!("nobody")])
                .await
                .unwrap(),
            json!("0")
        );
    }
}
