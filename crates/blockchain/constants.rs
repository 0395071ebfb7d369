/// Upper bound a builder targets for its own blocks.
pub const DEFAULT_BUILDER_GAS_CEIL: u64 = 30_000_000;

/// Minimum gas any pooled transaction needs (a plain transfer).
pub const MIN_TX_GAS: u64 = 21_000;

/// A replacement must bump the effective tip by this percentage.
pub const TX_REPLACEMENT_PRICE_BUMP_PERCENT: u64 = 10;

/// Pool admission requires the fee cap to reach at least this fraction
/// (in percent) of the current base fee.
pub const POOL_BASE_FEE_RATIO_PERCENT: u64 = 100;

/// Maximum transactions the pool holds before rejecting new senders.
pub const MAX_POOL_SIZE: usize = 4096;
