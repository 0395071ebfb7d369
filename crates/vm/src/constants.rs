pub const WORD_SIZE: usize = 32;

pub const STACK_LIMIT: usize = 1024;
pub const CALL_DEPTH_LIMIT: usize = 1024;

pub const MEMORY_EXPANSION_QUOTIENT: u64 = 512;

/// Base cost of every transaction.
pub const TX_BASE_COST: u64 = 21_000;

/// Cost per zero byte of transaction data.
pub const TX_DATA_ZERO_COST: u64 = 4;

/// EIP-170 deployed-code cap and the EIP-3860 initcode cap derived from it.
pub const MAX_CODE_SIZE: usize = 0x6000;
pub const MAX_INITCODE_SIZE: usize = 2 * MAX_CODE_SIZE;

pub const INIT_CODE_WORD_COST: u64 = 2;
pub const CODE_DEPOSIT_COST: u64 = 200;
pub const CREATE_BASE_COST: u64 = 32_000;

/// Deployed code may not start with this byte (EIP-3541) unless it is a
/// valid EOF container (EIP-3540).
pub const EOF_PREFIX: u8 = 0xef;
pub const EOF_MAGIC: [u8; 2] = [0xef, 0x00];
pub const EOF_VERSION_1: u8 = 0x01;

/// BLOCKHASH reaches at most this many blocks back.
pub const LAST_AVAILABLE_BLOCK_LIMIT: u64 = 256;

pub const GAS_PER_BLOB: u64 = 131_072;
pub const MAX_BLOB_COUNT: usize = 6;
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;
pub const MIN_BASE_FEE_PER_BLOB_GAS: u64 = 1;
pub const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 3_338_477;
