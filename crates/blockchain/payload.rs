//! Pending-block construction: picks pooled transactions by effective tip
//! under the block gas and blob budgets, executes them against a scratch
//! copy of the head state, and assembles the sealed-payload artifacts
//! (block, receipts, blob sidecar bundle, fee value).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, U256};
use ethrun_core::chain_spec::ChainSpec;
use ethrun_core::types::{
    bloom_from_logs, calc_excess_blob_gas, compute_receipts_root, compute_transactions_root,
    compute_withdrawals_root, BlobsBundle, Block, BlockBody, BlockHash, BlockHeader, Fork,
    ForkHead, MempoolTransaction, Receipt, Transaction, Withdrawal, DEFAULT_OMMERS_HASH,
    GAS_PER_BLOB, INITIAL_BASE_FEE, MAX_BLOB_GAS_PER_BLOCK,
};
use ethrun_core::types::calculate_base_fee_per_gas;
use ethrun_vm::environment::{Environment, EvmConfig};
use ethrun_vm::errors::VMError;
use ethrun_vm::journal::JournaledState;
use ethrun_vm::VM;
use sha3::{Digest, Keccak256};
use tracing::{debug, info};

use crate::constants::{DEFAULT_BUILDER_GAS_CEIL, MIN_TX_GAS};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::store::Store;

pub struct BuildPayloadArgs {
    pub parent: BlockHash,
    pub timestamp: u64,
    pub fee_recipient: Address,
    pub random: H256,
    pub withdrawals: Vec<Withdrawal>,
    pub beacon_root: Option<H256>,
    pub version: u8,
}

impl BuildPayloadArgs {
    /// Computes an 8-byte identifier by hashing the components of the
    /// payload arguments, with the version stamped into the first byte.
    pub fn id(&self) -> u64 {
        let mut hasher = Keccak256::new();
        hasher.update(self.parent);
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.random);
        hasher.update(self.fee_recipient);
        hasher.update(compute_withdrawals_root(&self.withdrawals));
        if let Some(beacon_root) = self.beacon_root {
            hasher.update(beacon_root);
        }
        let mut digest = [0u8; 8];
        digest.copy_from_slice(&hasher.finalize()[..8]);
        digest[0] = self.version;
        u64::from_be_bytes(digest)
    }
}

/// Everything a `getPayload`-shaped consumer wants back.
#[derive(Debug, Clone)]
pub struct PayloadBuildResult {
    pub block: Block,
    pub receipts: Vec<Receipt>,
    pub blobs_bundle: BlobsBundle,
    /// Total tips earned by the fee recipient.
    pub block_value: U256,
}

/// One registered payload build, re-buildable until stopped.
pub struct PayloadBuild {
    pub args: BuildPayloadArgs,
    cancel: AtomicBool,
    best: std::sync::Mutex<Option<PayloadBuildResult>>,
}

impl PayloadBuild {
    pub fn new(args: BuildPayloadArgs) -> Self {
        Self {
            args,
            cancel: AtomicBool::new(false),
            best: std::sync::Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(AtomicOrdering::SeqCst)
    }

    pub fn best(&self) -> Option<PayloadBuildResult> {
        self.best
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Keeps the higher-value result and returns the current best.
    pub fn offer(&self, candidate: PayloadBuildResult) -> PayloadBuildResult {
        let mut best = self
            .best
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*best {
            Some(current) if current.block_value >= candidate.block_value => current.clone(),
            _ => {
                *best = Some(candidate.clone());
                candidate
            }
        }
    }
}

/// Candidate ordering for the fill loop: highest effective tip first,
/// earliest arrival breaking ties.
struct TipOrdered {
    tip: u64,
    tx: MempoolTransaction,
}

impl PartialEq for TipOrdered {
    fn eq(&self, other: &Self) -> bool {
        self.tip == other.tip && self.tx.time() == other.tx.time()
    }
}

impl Eq for TipOrdered {}

impl Ord for TipOrdered {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tip
            .cmp(&other.tip)
            .then_with(|| other.tx.time().cmp(&self.tx.time()))
    }
}

impl PartialOrd for TipOrdered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the payload once: header from the parent, withdrawals applied,
/// transactions filled by tip until the budgets run out, the cancellation
/// flag fires or the deadline passes.
pub fn build_payload(
    build: &PayloadBuild,
    store: &Store,
    mempool: &Mempool,
    deadline: Option<Instant>,
) -> Result<PayloadBuildResult, ChainError> {
    let args = &build.args;
    if build.is_cancelled() {
        if let Some(best) = build.best() {
            return Ok(best);
        }
    }

    let parent = store
        .get_block_header(args.parent)
        .ok_or(ChainError::ParentNotFound)?;

    let spec = spec_at(store.chain_spec(), parent.number + 1, args.timestamp)?;
    let config = EvmConfig::new(&spec);

    let gas_limit = calc_gas_limit(parent.gas_limit, DEFAULT_BUILDER_GAS_CEIL);
    let base_fee_per_gas = calculate_base_fee_per_gas(
        gas_limit,
        parent.gas_limit,
        parent.gas_used,
        parent.base_fee_per_gas.unwrap_or(INITIAL_BASE_FEE),
    );
    let excess_blob_gas = spec.gte_fork(Fork::Cancun).then(|| {
        calc_excess_blob_gas(
            parent.excess_blob_gas.unwrap_or_default(),
            parent.blob_gas_used.unwrap_or_default(),
        )
    });

    let mut header = BlockHeader {
        parent_hash: args.parent,
        ommers_hash: *DEFAULT_OMMERS_HASH,
        coinbase: args.fee_recipient,
        state_root: parent.state_root,
        transactions_root: compute_transactions_root(&[]),
        receipts_root: compute_receipts_root(&[]),
        logs_bloom: Bloom::zero(),
        difficulty: U256::zero(),
        number: parent.number + 1,
        gas_limit,
        gas_used: 0,
        timestamp: args.timestamp,
        extra_data: Bytes::new(),
        prev_randao: args.random,
        nonce: 0,
        base_fee_per_gas,
        withdrawals_root: spec
            .gte_fork(Fork::Shanghai)
            .then(|| compute_withdrawals_root(&args.withdrawals)),
        blob_gas_used: spec.gte_fork(Fork::Cancun).then_some(0),
        excess_blob_gas,
        parent_beacon_block_root: args.beacon_root,
    };

    // Scratch state over the canonical head; nothing here touches the store.
    let mut state = JournaledState::new(Arc::new(store.clone()));
    apply_withdrawals(&mut state, &args.withdrawals)?;

    let fill = fill_transactions(
        build,
        store,
        mempool,
        &mut state,
        &spec,
        &config,
        &header,
        deadline,
    )?;

    header.gas_used = fill.gas_used;
    header.transactions_root = compute_transactions_root(&fill.transactions);
    header.receipts_root = compute_receipts_root(&fill.receipts);
    header.logs_bloom = fill.bloom;
    if spec.gte_fork(Fork::Cancun) {
        header.blob_gas_used = Some(fill.blob_gas_used);
    }

    let block = Block {
        header,
        body: BlockBody {
            transactions: fill.transactions,
            ommers: Vec::new(),
            withdrawals: spec
                .gte_fork(Fork::Shanghai)
                .then(|| args.withdrawals.clone()),
        },
    };

    info!(
        number = block.header.number,
        txs = block.body.transactions.len(),
        gas_used = block.header.gas_used,
        value = %fill.block_value,
        "payload built"
    );

    Ok(build.offer(PayloadBuildResult {
        block,
        receipts: fill.receipts,
        blobs_bundle: fill.blobs_bundle,
        block_value: fill.block_value,
    }))
}

/// Resolves the fork the pending block runs under.
fn spec_at(spec: &ChainSpec, number: u64, timestamp: u64) -> Result<ChainSpec, ChainError> {
    let mut pending = spec.clone();
    let fork = pending.fork_at(ForkHead {
        block_number: Some(number),
        timestamp: Some(timestamp),
        total_difficulty: None,
    })?;
    pending.set_fork(fork)?;
    Ok(pending)
}

/// Withdrawal amounts arrive in gwei (EIP-4895).
fn apply_withdrawals(
    state: &mut JournaledState,
    withdrawals: &[Withdrawal],
) -> Result<(), ChainError> {
    for withdrawal in withdrawals {
        let wei = U256::from(withdrawal.amount) * U256::from(1_000_000_000u64);
        state
            .increase_balance(withdrawal.address, wei)
            .map_err(ChainError::Evm)?;
    }
    Ok(())
}

struct FillOutcome {
    transactions: Vec<Transaction>,
    receipts: Vec<Receipt>,
    blobs_bundle: BlobsBundle,
    bloom: Bloom,
    gas_used: u64,
    blob_gas_used: u64,
    block_value: U256,
}

#[allow(clippy::too_many_arguments)]
fn fill_transactions(
    build: &PayloadBuild,
    store: &Store,
    mempool: &Mempool,
    state: &mut JournaledState,
    spec: &ChainSpec,
    config: &EvmConfig,
    header: &BlockHeader,
    deadline: Option<Instant>,
) -> Result<FillOutcome, ChainError> {
    let base_fee = header.base_fee_per_gas;
    let mut outcome = FillOutcome {
        transactions: Vec::new(),
        receipts: Vec::new(),
        blobs_bundle: BlobsBundle::default(),
        bloom: Bloom::zero(),
        gas_used: 0,
        blob_gas_used: 0,
        block_value: U256::zero(),
    };

    // Snapshot of the per-sender heads, ordered by effective tip.
    let mut heads: BinaryHeap<TipOrdered> = mempool
        .ready_heads(store)
        .into_iter()
        .filter_map(|tx| {
            tx.effective_gas_tip(base_fee)
                .map(|tip| TipOrdered { tip, tx })
        })
        .collect();

    let mut gas_remaining = header.gas_limit;
    let mut blob_gas_remaining = MAX_BLOB_GAS_PER_BLOCK;
    // Placeholder state ownership while the VM runs; swapped back after.
    let placeholder = Arc::new(ethrun_vm::db::Db::new());

    while let Some(TipOrdered { tip, tx }) = heads.pop() {
        if build.is_cancelled() {
            debug!("payload build cancelled, returning best-so-far");
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        if gas_remaining < MIN_TX_GAS {
            break;
        }

        let sender = tx.sender();
        let nonce = tx.nonce();

        // Over-budget heads are skipped for this block but stay pooled; the
        // sender's next transaction cannot run either (nonce gap), so the
        // sender is done for this payload.
        if tx.gas_limit() > gas_remaining {
            continue;
        }
        let blob_gas = tx.blob_versioned_hashes().len() as u64 * GAS_PER_BLOB;
        if blob_gas > blob_gas_remaining {
            continue;
        }

        // A transaction whose type/fields are not valid under the pending
        // block's fork is deferred, not evicted: it may become valid after
        // a fork switch.
        if tx.transaction().validate(spec).is_err() {
            continue;
        }

        let Some(gas_price) = tx.effective_gas_price(base_fee) else {
            continue;
        };

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
            tx_nonce: nonce,
            refunded_gas: 0,
        };

        let scratch = std::mem::replace(state, JournaledState::new(placeholder.clone()));
        let mut vm = VM::new(
            tx.to(),
            env,
            tx.value(),
            tx.data().clone(),
            scratch,
            tx.access_list().to_vec(),
        );
        let execution = vm.transact();
        *state = vm.into_state();

        match execution {
            Ok(report) => {
                outcome.gas_used += report.gas_used;
                gas_remaining -= report.gas_used.min(gas_remaining);
                outcome.block_value += U256::from(tip) * U256::from(report.gas_used);

                if !tx.blob_versioned_hashes().is_empty() {
                    blob_gas_remaining -= blob_gas;
                    outcome.blob_gas_used += blob_gas;
                    if let Some(bundle) = mempool.get_blobs_bundle(&tx.compute_hash()) {
                        outcome.blobs_bundle.extend(&bundle);
                    }
                }

                let receipt = Receipt::new(
                    tx.tx_type(),
                    report.is_success(),
                    outcome.gas_used,
                    if report.is_success() {
                        report.logs.clone()
                    } else {
                        Vec::new()
                    },
                );
                outcome.bloom.accrue_bloom(&bloom_from_logs(&receipt.logs));
                outcome.receipts.push(receipt);
                outcome.transactions.push(tx.transaction().clone());

                // The sender's next nonce becomes the new head.
                if let Some(next) = mempool.next_for_sender(&sender, nonce) {
                    if let Some(tip) = next.effective_gas_tip(base_fee) {
                        heads.push(TipOrdered { tip, tx: next });
                    }
                }
            }
            Err(VMError::TxValidation(reason)) => {
                // Unexecutable against this state: drop it from the pool.
                debug!(?reason, sender = ?sender, nonce, "dropping pool transaction");
                mempool.remove_transaction(&tx.compute_hash());
            }
            Err(error) => return Err(ChainError::Evm(error)),
        }
    }

    Ok(outcome)
}

fn calc_gas_limit(parent_gas_limit: u64, desired_limit: u64) -> u64 {
    let delta = parent_gas_limit / ethrun_core::types::GAS_LIMIT_ADJUSTMENT_FACTOR - 1;
    let desired_limit = desired_limit.max(ethrun_core::types::GAS_LIMIT_MINIMUM);
    let mut limit = parent_gas_limit;
    if limit < desired_limit {
        limit = parent_gas_limit + delta;
        if limit > desired_limit {
            limit = desired_limit;
        }
        return limit;
    }
    if limit > desired_limit {
        limit = parent_gas_limit - delta;
        if limit < desired_limit {
            limit = desired_limit;
        }
    }
    limit
}

/// Total fees a sealed payload pays its recipient, recomputed from receipts.
pub fn payload_block_value(block: &Block, receipts: &[Receipt]) -> Option<U256> {
    let mut total_fee = U256::zero();
    let mut last_cumulative_gas = 0u64;
    for (tx, receipt) in block.body.transactions.iter().zip(receipts) {
        let tip = tx.effective_gas_tip(block.header.base_fee_per_gas)?;
        total_fee += U256::from(tip) * U256::from(receipt.cumulative_gas_used - last_cumulative_gas);
        last_cumulative_gas = receipt.cumulative_gas_used;
    }
    Some(total_fee)
}
