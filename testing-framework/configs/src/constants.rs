/// Wall-clock budget granted to each awaited block.
pub const DEFAULT_BLOCK_TIMEOUT_SECS: u64 = 60;

/// Outer attempts the account provisioner makes before giving up.
pub const DEFAULT_PROVISION_ATTEMPTS: usize = 5;

/// Transfers submitted per provisioning batch. Nonces keep increasing across
/// batch boundaries.
pub const DEFAULT_PROVISION_BATCH_SIZE: usize = 500;

/// Blocks awaited after each provisioning attempt before balances are
/// re-read.
pub const DEFAULT_SETTLE_BLOCKS: u64 = 2;

/// Extra settle blocks granted for every batch beyond the first.
pub const DEFAULT_BLOCKS_PER_EXTRA_BATCH: u64 = 1;

/// Decimal places of the chain's base currency unit.
pub const DEFAULT_NOMINAL_DECIMALS: u32 = 12;

/// Blocks observed after a scenario body before expectations evaluate.
pub const DEFAULT_COOLDOWN_BLOCKS: u64 = 1;
