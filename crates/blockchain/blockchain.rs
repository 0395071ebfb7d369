pub mod constants;
pub mod error;
pub mod mempool;
pub mod payload;
pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ethereum_types::U256;
use ethrun_core::types::{
    compute_receipts_root, compute_transactions_root, validate_block_header,
    validate_cancun_header_fields, validate_no_cancun_header_fields, Block, BlockHash, Fork,
    ForkHead, Receipt, Transaction,
};
use ethrun_vm::environment::{Environment, EvmConfig};
use ethrun_vm::journal::JournaledState;
use ethrun_vm::VM;
use tracing::info;

use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::payload::{build_payload, BuildPayloadArgs, PayloadBuild, PayloadBuildResult};
use crate::store::Store;

/// The chain frontend: block import, the transaction pool and payload
/// building over one shared store.
pub struct Blockchain {
    pub storage: Store,
    pub mempool: Mempool,
    payloads: Mutex<HashMap<u64, Arc<PayloadBuild>>>,
}

impl Blockchain {
    pub fn new(storage: Store) -> Self {
        Self {
            storage,
            mempool: Mempool::new(),
            payloads: Mutex::new(HashMap::new()),
        }
    }

    /// Validates and executes a block on top of its parent, stores it and
    /// moves the canonical head.
    pub fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let hash = block.hash();
        if self.storage.get_block(hash).is_some() {
            return Err(ChainError::BlockAlreadyKnown);
        }
        let parent = self
            .storage
            .get_block_header(block.header.parent_hash)
            .ok_or(ChainError::ParentNotFound)?;

        validate_block_header(&block.header, &parent)?;

        let spec = self.spec_for(block.header.number, block.header.timestamp)?;
        if spec.gte_fork(Fork::Cancun) {
            validate_cancun_header_fields(&block.header, &parent)?;
        } else {
            validate_no_cancun_header_fields(&block.header)?;
        }

        let expected_tx_root = compute_transactions_root(&block.body.transactions);
        if expected_tx_root != block.header.transactions_root {
            return Err(ChainError::TransactionsRootMismatch);
        }

        let (receipts, updates) = self.execute_block(&block, &spec)?;

        let executed_gas = receipts.last().map(|r| r.cumulative_gas_used).unwrap_or(0);
        if executed_gas != block.header.gas_used {
            return Err(ChainError::GasUsedMismatch {
                header: block.header.gas_used,
                executed: executed_gas,
            });
        }
        if compute_receipts_root(&receipts) != block.header.receipts_root {
            return Err(ChainError::ReceiptsRootMismatch);
        }

        self.storage.apply_account_updates(&updates);
        self.storage.add_block(block.clone());
        self.storage.add_receipts(hash, receipts);
        self.storage.set_canonical(&block);
        self.mempool.prune_stale(&block.body.transactions, &self.storage);

        info!(
            number = block.header.number,
            hash = ?hash,
            txs = block.body.transactions.len(),
            "block imported"
        );
        Ok(())
    }

    fn spec_for(
        &self,
        number: u64,
        timestamp: u64,
    ) -> Result<ethrun_core::chain_spec::ChainSpec, ChainError> {
        let mut spec = self.storage.chain_spec().clone();
        let fork = spec.fork_at(ForkHead {
            block_number: Some(number),
            timestamp: Some(timestamp),
            total_difficulty: None,
        })?;
        spec.set_fork(fork)?;
        Ok(spec)
    }

    fn execute_block(
        &self,
        block: &Block,
        spec: &ethrun_core::chain_spec::ChainSpec,
    ) -> Result<
        (
            Vec<Receipt>,
            HashMap<ethereum_types::Address, ethrun_vm::Account>,
        ),
        ChainError,
    > {
        let config = EvmConfig::new(spec);
        let header = &block.header;
        let base_fee = header.base_fee_per_gas;

        let mut state = JournaledState::new(Arc::new(self.storage.clone()));
        if let Some(withdrawals) = &block.body.withdrawals {
            for withdrawal in withdrawals {
                state
                    .increase_balance(
                        withdrawal.address,
                        U256::from(withdrawal.amount) * U256::from(1_000_000_000u64),
                    )
                    .map_err(ChainError::Evm)?;
            }
        }

        let mut receipts = Vec::with_capacity(block.body.transactions.len());
        let mut cumulative_gas = 0u64;
        let placeholder = Arc::new(ethrun_vm::db::Db::new());

        for tx in &block.body.transactions {
            let sender = tx.sender()?;
            let gas_price = tx
                .effective_gas_price(base_fee)
                .unwrap_or_else(|| tx.gas_price());

            let env = Environment {
                origin: sender,
                gas_limit: tx.gas_limit(),
                config: config.clone(),
                block_number: header.number.into(),
                coinbase: header.coinbase,
                timestamp: header.timestamp.into(),
                prev_randao: Some(header.prev_randao),
                difficulty: header.difficulty,
                chain_id: spec.chain_id().into(),
                base_fee_per_gas: base_fee.unwrap_or_default().into(),
                gas_price: gas_price.into(),
                block_gas_limit: header.gas_limit,
                block_excess_blob_gas: header.excess_blob_gas.map(Into::into),
                tx_blob_hashes: tx.blob_versioned_hashes().to_vec(),
                tx_max_priority_fee_per_gas: tx.max_priority_fee().map(Into::into),
                tx_max_fee_per_gas: tx.max_fee_per_gas().map(Into::into),
                tx_max_fee_per_blob_gas: tx.max_fee_per_blob_gas(),
                tx_nonce: tx.nonce(),
                refunded_gas: 0,
            };

            let scratch = std::mem::replace(&mut state, JournaledState::new(placeholder.clone()));
            let mut vm = VM::new(
                tx.to(),
                env,
                tx.value(),
                tx.data().clone(),
                scratch,
                tx.access_list().to_vec(),
            );
            let report = vm.transact().map_err(ChainError::Evm)?;
            state = vm.into_state();

            cumulative_gas += report.gas_used;
            receipts.push(Receipt::new(
                tx.tx_type(),
                report.is_success(),
                cumulative_gas,
                if report.is_success() {
                    report.logs
                } else {
                    Vec::new()
                },
            ));
        }

        Ok((receipts, state.cache().clone()))
    }

    // ===== payload building =====

    /// Registers a payload build and returns its stable id. Re-registering
    /// the same arguments yields the same id.
    pub fn start_payload(&self, args: BuildPayloadArgs) -> u64 {
        let id = args.id();
        let mut payloads = self
            .payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        payloads
            .entry(id)
            .or_insert_with(|| Arc::new(PayloadBuild::new(args)));
        id
    }

    /// Builds (or re-builds) the payload, returning the best result so far.
    /// With a deadline, the fill loop stops when it expires.
    pub fn build_payload(
        &self,
        payload_id: u64,
        deadline: Option<Instant>,
    ) -> Result<PayloadBuildResult, ChainError> {
        let build = self
            .payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&payload_id)
            .cloned()
            .ok_or(ChainError::UnknownPayload(payload_id))?;
        build_payload(&build, &self.storage, &self.mempool, deadline)
    }

    /// Cancels a payload build. Idempotent; unknown ids are ignored.
    pub fn stop_payload(&self, payload_id: u64) {
        let payloads = self
            .payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(build) = payloads.get(&payload_id) {
            build.cancel();
        }
    }

    /// Admits a transaction into the pool.
    pub fn add_transaction_to_pool(
        &self,
        tx: Transaction,
    ) -> Result<ethereum_types::H256, crate::error::MempoolError> {
        self.mempool.add_transaction(tx, &self.storage)
    }

    pub fn latest_block_hash(&self) -> Option<BlockHash> {
        self.storage.latest_block_hash()
    }
}
