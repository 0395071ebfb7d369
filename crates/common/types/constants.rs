// Protocol constants shared across the workspace. Fork/EIP-dependent gas
// parameters live in `crate::params`; the values here are schedule-invariant.

/// Base fee of the first EIP-1559 block (London activation or 1559 genesis).
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// `BASE_FEE_MAX_CHANGE_DENOMINATOR` from EIP-1559.
pub const BASE_FEE_MAX_CHANGE_DENOMINATOR: u64 = 8;

/// `ELASTICITY_MULTIPLIER` from EIP-1559.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Divisor bounding per-block gas limit adjustment.
pub const GAS_LIMIT_ADJUSTMENT_FACTOR: u64 = 1024;

/// Minimum block gas limit.
pub const GAS_LIMIT_MINIMUM: u64 = 5000;

// EIP-4844 blob schedule (Cancun).
pub const BYTES_PER_BLOB: usize = 131_072; // 4096 field elements * 32 bytes
pub const GAS_PER_BLOB: u64 = 131_072; // 2^17
pub const MAX_BLOB_GAS_PER_BLOCK: u64 = 786_432; // 6 blobs
pub const TARGET_BLOB_GAS_PER_BLOCK: u64 = 393_216; // 3 blobs
pub const MAX_BLOBS_PER_BLOCK: u64 = MAX_BLOB_GAS_PER_BLOCK / GAS_PER_BLOB;
pub const MIN_BASE_FEE_PER_BLOB_GAS: u64 = 1;
pub const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 3_338_477;

/// Version byte of KZG versioned hashes (EIP-4844).
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

use ethereum_types::U256;
use lazy_static::lazy_static;

lazy_static! {
    /// secp256k1 group order, and its half used by the EIP-2 low-s rule.
    pub static ref SECP256K1_ORDER: U256 = U256::from_str_radix(
        "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
        16
    )
    .unwrap();
    pub static ref SECP256K1_ORDER_HALF: U256 = *SECP256K1_ORDER / 2;
}
