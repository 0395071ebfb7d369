use bytes::Bytes;
use ethereum_types::Address;
use ethrun_core::types::Log;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that halt the current execution context.
///
/// `RevertOpcode` keeps the return data and the remaining gas; every other
/// variant consumes the frame's gas and discards its side effects.
/// `Internal` variants are never caused by contract code and abort the whole
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Invalid jump destination")]
    InvalidJump,
    #[error("State-changing opcode in a static context")]
    OpcodeNotAllowedInStaticContext,
    #[error("Invalid opcode")]
    InvalidOpcode,
    #[error("Very large number popped from the stack")]
    VeryLargeNumber,
    #[error("Return data access out of bounds")]
    ReturnDataOutOfBounds,
    #[error("Revert opcode")]
    RevertOpcode,
    #[error("Out of gas: {0}")]
    OutOfGas(#[from] OutOfGasError),
    #[error("Contract output exceeds the maximum code size")]
    ContractOutputTooBig,
    #[error("Deployed code starts with the 0xEF reserved byte")]
    InvalidContractPrefix,
    #[error("Invalid EOF container: {0}")]
    InvalidEofFormat(#[from] EofError),
    #[error("Initcode exceeds the maximum size")]
    InitcodeSizeExceeded,
    #[error("Address collision on contract creation")]
    CreateCollision,
    #[error("Balance overflow")]
    BalanceOverflow,
    #[error("Balance underflow")]
    BalanceUnderflow,
    #[error("Nonce overflow")]
    NonceOverflow,
    #[error("Out of gas while storing contract code")]
    CodeStoreOutOfGas,
    #[error("Gas refunds were applied twice")]
    RefundUnderflow,
    #[error("Transaction validation error: {0}")]
    TxValidation(#[from] TxValidationError),
    #[error("Precompile execution error: {0}")]
    Precompile(#[from] PrecompileError),
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

impl VMError {
    /// Internal errors abort execution instead of reverting the frame.
    pub fn is_internal(&self) -> bool {
        matches!(self, VMError::Internal(_) | VMError::TxValidation(_))
    }

    /// Whether the error consumes all gas left in the frame. Only an
    /// explicit REVERT refunds what remains.
    pub fn should_consume_all_gas(&self) -> bool {
        !matches!(self, VMError::RevertOpcode)
    }
}

/// Validation failures of the transaction envelope, raised before execution
/// starts. These surface to the caller as errors, not as reverted frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxValidationError {
    #[error("Gas limit times gas price overflows")]
    GasLimitPriceProductOverflow,
    #[error("Insufficient account funds")]
    InsufficientAccountFunds,
    #[error("Intrinsic gas exceeds the gas limit")]
    IntrinsicGasTooLow,
    #[error("Max fee per gas is lower than the block base fee")]
    InsufficientMaxFeePerGas,
    #[error("Initcode exceeds the maximum size")]
    InitcodeSizeExceeded,
    #[error("Sender nonce is at the maximum")]
    NonceIsMax,
    #[error("Nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("Priority fee is greater than the max fee per gas")]
    PriorityGreaterThanMaxFeePerGas,
    #[error("Sender account is not an EOA")]
    SenderNotEoa,
    #[error("Gas limit exceeds the block gas limit")]
    GasAllowanceExceeded,
    #[error("Max fee per blob gas is lower than the blob base fee")]
    InsufficientMaxFeePerBlobGas,
    #[error("Blob transaction without blobs")]
    Type3TxZeroBlobs,
    #[error("Invalid blob versioned hash version")]
    Type3TxInvalidBlobVersionedHash,
    #[error("Blob count exceeds the per-block maximum")]
    Type3TxBlobCountExceeded,
    #[error("Blob transactions cannot create contracts")]
    Type3TxContractCreation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutOfGasError {
    #[error("Gas limit exceeded")]
    MaxGasLimitExceeded,
    #[error("Gas cost overflow")]
    GasCostOverflow,
    #[error("Consumed gas overflow")]
    ConsumedGasOverflow,
    #[error("Arithmetic operation overflow in gas computation")]
    ArithmeticOperationOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecompileError {
    #[error("Not enough gas for the precompile")]
    NotEnoughGas,
    #[error("Malformed precompile input")]
    ParsingInputError,
    #[error("Point is not on the curve")]
    InvalidPoint,
    #[error("Point is not in the expected subgroup")]
    InvalidSubgroupPoint,
    #[error("KZG proof verification failed")]
    InvalidKzgProof,
    #[error("BLS/KZG backend not initialized")]
    CryptoNotInitialized,
    #[error("Gas consumed overflow in precompile")]
    GasConsumedOverflow,
}

/// Malformed EOF v1 container (EIP-3540/3670).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EofError {
    #[error("missing or wrong magic")]
    InvalidMagic,
    #[error("unsupported version")]
    InvalidVersion,
    #[error("malformed section headers")]
    InvalidSectionHeaders,
    #[error("section sizes do not match the container length")]
    InvalidContainerSize,
    #[error("undefined opcode {0:#04x} in code section")]
    UndefinedInstruction(u8),
    #[error("code section ends in the middle of a push")]
    TruncatedPush,
}

/// Failures that indicate a bug in the interpreter itself rather than in the
/// executed contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("arithmetic operation overflow")]
    ArithmeticOverflow,
    #[error("arithmetic operation underflow")]
    ArithmeticUnderflow,
    #[error("could not compute a create address")]
    CouldNotComputeCreateAddress,
    #[error("journal checkpoints are unbalanced")]
    JournalUnbalanced,
    #[error("account expected in cache was not found")]
    AccountNotFound,
    #[error("program counter overflowed")]
    PcOverflow,
    #[error("slicing out of bounds")]
    SlicingError,
    #[error("type conversion failed")]
    ConversionError,
    #[error("{0}")]
    Custom(String),
}

pub enum OpcodeSuccess {
    Continue,
    Result(ResultReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultReason {
    Stop,
    Return,
    SelfDestruct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    Success,
    Revert(VMError),
}

/// The outcome of one full transaction or raw-code run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub result: TxResult,
    pub gas_used: u64,
    pub gas_refunded: u64,
    pub output: Bytes,
    pub logs: Vec<Log>,
    pub created_address: Option<Address>,
    /// Accounts scheduled for destruction by SELFDESTRUCT.
    pub selfdestructed: HashSet<Address>,
    /// Accounts created during this transaction (EIP-6780 bookkeeping).
    pub created_accounts: HashSet<Address>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TxResult::Success)
    }
}
