use std::time::Duration;

use testing_framework_core::chain::{AccountId, Balance};

/// Well-known development identities, endowed at genesis.
pub const DEV_ACCOUNTS: [&str; 6] = ["alice", "bob", "charlie", "dave", "eve", "ferdie"];

const DEFAULT_BLOCK_CAPACITY: usize = 1024;
const DEFAULT_SEAL_INTERVAL: Duration = Duration::from_millis(50);
// 10^9 whole units at 12 decimals.
const DEFAULT_DEV_ENDOWMENT: Balance = 1_000_000_000_000_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sealing {
    /// Blocks are produced only by [`crate::LocalChain::seal_block`].
    Manual,
    /// A background task seals a block every interval.
    Interval(Duration),
}

#[derive(Clone, Debug)]
pub struct LocalChainConfig {
    pub sealing: Sealing,
    /// Extrinsics included per block; the rest wait for later blocks.
    pub block_capacity: usize,
    pub endowments: Vec<(AccountId, Balance)>,
}

impl Default for LocalChainConfig {
    fn default() -> Self {
        Self {
            sealing: Sealing::Interval(DEFAULT_SEAL_INTERVAL),
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            endowments: DEV_ACCOUNTS
                .iter()
                .map(|name| (AccountId::from(*name), DEFAULT_DEV_ENDOWMENT))
                .collect(),
        }
    }
}

impl LocalChainConfig {
    #[must_use]
    pub fn manual() -> Self {
        Self::default().with_sealing(Sealing::Manual)
    }

    #[must_use]
    pub fn interval(every: Duration) -> Self {
        Self::default().with_sealing(Sealing::Interval(every))
    }

    #[must_use]
    pub const fn with_sealing(mut self, sealing: Sealing) -> Self {
        self.sealing = sealing;
        self
    }

    #[must_use]
    pub const fn with_block_capacity(mut self, capacity: usize) -> Self {
        self.block_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_endowment(mut self, account: impl Into<AccountId>, balance: Balance) -> Self {
        let account = account.into();
        self.endowments.retain(|(existing, _)| *existing != account);
        self.endowments.push((account, balance));
        self
    }
}
