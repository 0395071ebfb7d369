use ethrun_core::types::{ChainConfigError, InvalidBlockHeaderError, InvalidTransaction};
use ethrun_rlp::error::RLPDecodeError;
use ethrun_vm::errors::VMError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("no canonical head to validate against")]
    NoBlockHeader,
    #[error(transparent)]
    InvalidTransaction(#[from] InvalidTransaction),
    #[error("transaction nonce {got} is lower than the account nonce {expected}")]
    NonceTooLow { expected: u64, got: u64 },
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,
    #[error("fee cap below the current base fee floor")]
    FeeBelowBase,
    #[error("transaction pool is full")]
    PoolFull,
    #[error("sender balance cannot cover the transaction cost")]
    InsufficientFunds,
    #[error("gas limit above the block gas limit")]
    GasLimitExceeded,
    #[error("intrinsic gas above the transaction gas limit")]
    IntrinsicGasTooLow,
    #[error("initcode above the maximum size")]
    InitCodeTooLarge,
    #[error("blob transaction without its sidecar")]
    MissingBlobSidecar,
    #[error("invalid blob sidecar: {0}")]
    InvalidBlobSidecar(String),
    #[error("transaction gas overflow")]
    GasOverflow,
    #[error(transparent)]
    Decode(#[from] RLPDecodeError),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("parent block not found")]
    ParentNotFound,
    #[error("block already known")]
    BlockAlreadyKnown,
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] InvalidBlockHeaderError),
    #[error("gas used mismatch: header {header}, executed {executed}")]
    GasUsedMismatch { header: u64, executed: u64 },
    #[error("receipts root mismatch")]
    ReceiptsRootMismatch,
    #[error("transactions root mismatch")]
    TransactionsRootMismatch,
    #[error("sender recovery failed: {0}")]
    SenderRecovery(#[from] InvalidTransaction),
    #[error("chain configuration error: {0}")]
    Config(#[from] ChainConfigError),
    #[error("EVM failure: {0}")]
    Evm(#[from] VMError),
    #[error("unknown payload id {0}")]
    UnknownPayload(u64),
}
