use std::time::Duration;

/// Budget for awaiting `blocks` consecutive headers.
#[must_use]
pub fn blocks_timeout(per_block: Duration, blocks: u64) -> Duration {
    let blocks = u32::try_from(blocks).unwrap_or(u32::MAX);
    per_block.saturating_mul(blocks)
}
