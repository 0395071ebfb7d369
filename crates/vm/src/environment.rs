use ethereum_types::{Address, H256, U256};
use ethrun_core::chain_spec::ChainSpec;
use ethrun_core::params::{self, ParamTopic};
use ethrun_core::types::Fork;

use crate::constants::{MAX_CODE_SIZE, MAX_INITCODE_SIZE};

/// Immutable snapshot of the chain spec taken when an EVM is constructed.
///
/// The spec's fork-change signal invalidates anything derived from it;
/// holders of an `EvmConfig` (and of the opcode/precompile tables built from
/// one) are expected to rebuild rather than keep using a stale copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmConfig {
    pub fork: Fork,
    extra_eips: Vec<u64>,
    pub chain_id: u64,
    pub max_code_size: usize,
    pub max_initcode_size: usize,
    /// Debug escape hatch: skip the EIP-3860 size cap while still charging
    /// the per-word cost.
    pub allow_unlimited_initcode: bool,
    /// Refund cap denominator: gas_used / 5 after London, / 2 before.
    pub refund_quotient: u64,
    pub tx_data_non_zero_cost: u64,
    pub blob_hash_version: u8,
}

impl EvmConfig {
    pub fn new(spec: &ChainSpec) -> Self {
        let max_code_size = spec.param(ParamTopic::Vm, "maxCodeSize").low_u64() as usize;
        let max_initcode_size = spec.param(ParamTopic::Vm, "maxInitCodeSize").low_u64() as usize;
        Self {
            fork: spec.fork(),
            extra_eips: spec.active_eips().to_vec(),
            chain_id: spec.chain_id(),
            max_code_size: if max_code_size == 0 {
                MAX_CODE_SIZE
            } else {
                max_code_size
            },
            max_initcode_size: if max_initcode_size == 0 {
                MAX_INITCODE_SIZE
            } else {
                max_initcode_size
            },
            allow_unlimited_initcode: false,
            refund_quotient: spec
                .param(ParamTopic::GasPrices, "maxRefundQuotient")
                .low_u64()
                .max(2),
            tx_data_non_zero_cost: spec
                .param(ParamTopic::GasPrices, "txDataNonZero")
                .low_u64(),
            blob_hash_version: spec
                .param(ParamTopic::Sharding, "blobCommitmentVersionKzg")
                .low_u64() as u8,
        }
    }

    pub fn new_for_fork(fork: Fork) -> Self {
        Self::new(&ChainSpec::custom(1, fork))
    }

    pub fn with_unlimited_initcode(mut self) -> Self {
        self.allow_unlimited_initcode = true;
        self
    }

    pub fn gte(&self, fork: Fork) -> bool {
        self.fork >= fork
    }

    /// Active through the fork bundle or the extra EIP list of the spec this
    /// config was taken from.
    pub fn is_activated(&self, eip: u64) -> bool {
        self.extra_eips.contains(&eip)
            || self
                .fork
                .iter_back()
                .any(|fork| params::fork_eips(fork).contains(&eip))
    }
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self::new_for_fork(Fork::Cancun)
    }
}

/// Transaction-level execution context: block values plus the fee fields of
/// the transaction being run.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// The sender of the transaction that originated this execution.
    pub origin: Address,
    pub refunded_gas: u64,
    pub gas_limit: u64,
    pub config: EvmConfig,
    pub block_number: U256,
    pub coinbase: Address,
    pub timestamp: U256,
    pub prev_randao: Option<H256>,
    pub difficulty: U256,
    pub chain_id: U256,
    pub base_fee_per_gas: U256,
    pub gas_price: U256,
    pub block_gas_limit: u64,
    pub block_excess_blob_gas: Option<U256>,
    pub tx_blob_hashes: Vec<H256>,
    pub tx_max_priority_fee_per_gas: Option<U256>,
    pub tx_max_fee_per_gas: Option<U256>,
    pub tx_max_fee_per_blob_gas: Option<U256>,
    pub tx_nonce: u64,
}

impl Environment {
    pub fn default_from_address(origin: Address) -> Self {
        Self {
            origin,
            gas_limit: u64::MAX,
            config: EvmConfig::default(),
            chain_id: U256::one(),
            block_gas_limit: u64::MAX,
            ..Default::default()
        }
    }
}
