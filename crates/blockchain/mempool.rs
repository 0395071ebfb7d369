//! Transaction pool: per-sender nonce-ordered queues behind a logical lock,
//! with the admission rules the payload builder relies on.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use ethereum_types::{Address, H256};
use ethrun_core::types::{
    BlobsBundle, MempoolTransaction, Transaction, WrappedEIP4844Transaction,
};
use tracing::debug;

use crate::constants::{
    MAX_POOL_SIZE, POOL_BASE_FEE_RATIO_PERCENT, TX_REPLACEMENT_PRICE_BUMP_PERCENT,
};
use crate::error::MempoolError;
use crate::store::Store;

// Defined in [EIP-170](https://eips.ethereum.org/EIPS/eip-170) and
// [EIP-3860](https://eips.ethereum.org/EIPS/eip-3860).
pub const MAX_CODE_SIZE: usize = 0x6000;
pub const MAX_INITCODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// Base gas cost for each non contract creating transaction.
pub const TX_GAS_COST: u64 = 21_000;
/// Additional gas for contract creating transactions.
pub const TX_CREATE_GAS_COST: u64 = 32_000;
/// Gas cost per zero byte of transaction data.
pub const TX_DATA_ZERO_GAS_COST: u64 = 4;
/// Gas cost per non-zero byte of transaction data.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;
/// Non-zero byte cost after [EIP-2028](https://eips.ethereum.org/EIPS/eip-2028).
pub const TX_DATA_NON_ZERO_GAS_EIP2028: u64 = 16;
/// Gas cost per initcode word (EIP-3860).
pub const TX_INIT_CODE_WORD_GAS_COST: u64 = 2;
/// Access-list costs (EIP-2930).
pub const TX_ACCESS_LIST_ADDRESS_GAS: u64 = 2400;
pub const TX_ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1900;

#[derive(Default)]
struct PoolInner {
    by_sender: HashMap<Address, BTreeMap<u64, MempoolTransaction>>,
    by_hash: HashMap<H256, (Address, u64)>,
    blobs: HashMap<H256, BlobsBundle>,
    size: usize,
}

/// The pool itself. Mutations go through the inner lock; readers get
/// consistent nonce-ordered views per sender.
pub struct Mempool {
    inner: RwLock<PoolInner>,
    clock: Mutex<u128>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            clock: Mutex::new(0),
        }
    }

    fn timestamp(&self) -> u128 {
        // A strictly monotonic arrival stamp; wall-clock ties are broken by
        // the counter.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros())
            .unwrap_or_default();
        let mut clock = self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *clock = now.max(*clock + 1);
        *clock
    }

    /// Validates and admits a plain (non-blob) transaction.
    pub fn add_transaction(&self, tx: Transaction, store: &Store) -> Result<H256, MempoolError> {
        if matches!(tx, Transaction::EIP4844Transaction(_)) {
            return Err(MempoolError::MissingBlobSidecar);
        }
        self.admit(tx, None, store)
    }

    /// Validates and admits a blob transaction with its sidecar; the KZG
    /// batch proof must verify (Cancun only).
    pub fn add_blob_transaction(
        &self,
        wrapped: WrappedEIP4844Transaction,
        store: &Store,
    ) -> Result<H256, MempoolError> {
        wrapped
            .validate()
            .map_err(|err| MempoolError::InvalidBlobSidecar(err.to_string()))?;
        self.admit(
            Transaction::EIP4844Transaction(wrapped.tx),
            Some(wrapped.blobs_bundle),
            store,
        )
    }

    fn admit(
        &self,
        tx: Transaction,
        sidecar: Option<BlobsBundle>,
        store: &Store,
    ) -> Result<H256, MempoolError> {
        let sender = validate_transaction(&tx, store)?;
        let hash = tx.compute_hash();
        let nonce = tx.nonce();

        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let inner = &mut *guard;

        let replaced = inner
            .by_sender
            .get(&sender)
            .and_then(|queue| queue.get(&nonce))
            .map(|existing| (existing.gas_tip_cap(), existing.compute_hash()));
        if let Some((old_tip, old_hash)) = replaced {
            // Same-nonce replacement needs a meaningful tip bump.
            let required =
                old_tip as u128 + old_tip as u128 * TX_REPLACEMENT_PRICE_BUMP_PERCENT as u128 / 100;
            if (tx.gas_tip_cap() as u128) < required {
                return Err(MempoolError::ReplacementUnderpriced);
            }
            inner.by_hash.remove(&old_hash);
            inner.blobs.remove(&old_hash);
            inner.size -= 1;
        } else if inner.size >= MAX_POOL_SIZE {
            return Err(MempoolError::PoolFull);
        }

        let pooled = MempoolTransaction::new(self.timestamp(), sender, tx);
        inner.by_hash.insert(hash, (sender, nonce));
        if let Some(bundle) = sidecar {
            inner.blobs.insert(hash, bundle);
        }
        inner
            .by_sender
            .entry(sender)
            .or_default()
            .insert(nonce, pooled);
        inner.size += 1;

        debug!(hash = ?hash, sender = ?sender, nonce, "transaction admitted to pool");
        Ok(hash)
    }

    /// Trusted local submission (dev mode): the transaction goes straight
    /// into the pool with a caller-supplied sender, skipping admission
    /// checks and KZG verification. Never exposed to network input.
    pub fn add_transaction_unvalidated(
        &self,
        tx: Transaction,
        sender: Address,
        sidecar: Option<BlobsBundle>,
    ) -> H256 {
        let hash = tx.compute_hash();
        let nonce = tx.nonce();
        let pooled = MempoolTransaction::new(self.timestamp(), sender, tx);
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let inner = &mut *guard;
        inner.by_hash.insert(hash, (sender, nonce));
        if let Some(bundle) = sidecar {
            inner.blobs.insert(hash, bundle);
        }
        if inner
            .by_sender
            .entry(sender)
            .or_default()
            .insert(nonce, pooled)
            .is_none()
        {
            inner.size += 1;
        }
        hash
    }

    pub fn remove_transaction(&self, hash: &H256) {
        let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((sender, nonce)) = inner.by_hash.remove(hash) {
            inner.blobs.remove(hash);
            let mut sender_drained = false;
            if let Some(queue) = inner.by_sender.get_mut(&sender) {
                queue.remove(&nonce);
                sender_drained = queue.is_empty();
            }
            if sender_drained {
                inner.by_sender.remove(&sender);
            }
            inner.size -= 1;
        }
    }

    pub fn get_transaction(&self, hash: &H256) -> Option<MempoolTransaction> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (sender, nonce) = inner.by_hash.get(hash)?;
        inner.by_sender.get(sender)?.get(nonce).cloned()
    }

    pub fn get_blobs_bundle(&self, hash: &H256) -> Option<BlobsBundle> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .blobs
            .get(hash)
            .cloned()
    }

    /// The sender's pending transactions in nonce order.
    pub fn by_sender(&self, sender: &Address) -> Vec<MempoolTransaction> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .by_sender
            .get(sender)
            .map(|queue| queue.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One executable head per sender: the lowest-nonce transaction at or
    /// above the sender's account nonce, with no gap.
    pub fn ready_heads(&self, store: &Store) -> Vec<MempoolTransaction> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .by_sender
            .iter()
            .filter_map(|(sender, queue)| {
                let account_nonce = store.account_nonce(*sender);
                queue.get(&account_nonce).cloned()
            })
            .collect()
    }

    /// The next pooled transaction of `sender` after `nonce`, if gapless.
    pub fn next_for_sender(&self, sender: &Address, nonce: u64) -> Option<MempoolTransaction> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.by_sender.get(sender)?.get(&(nonce + 1)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything a freshly imported block made stale: included
    /// transactions and anything whose nonce fell behind.
    pub fn prune_stale(&self, included: &[Transaction], store: &Store) {
        for tx in included {
            self.remove_transaction(&tx.compute_hash());
        }
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let inner = &mut *guard;
        let senders: Vec<Address> = inner.by_sender.keys().copied().collect();
        for sender in senders {
            let account_nonce = store.account_nonce(sender);
            let mut removed = Vec::new();
            let mut sender_drained = false;
            if let Some(queue) = inner.by_sender.get_mut(&sender) {
                let stale: Vec<u64> = queue.range(..account_nonce).map(|(nonce, _)| *nonce).collect();
                for nonce in stale {
                    if let Some(tx) = queue.remove(&nonce) {
                        removed.push(tx.compute_hash());
                    }
                }
                sender_drained = queue.is_empty();
            }
            if sender_drained {
                inner.by_sender.remove(&sender);
            }
            for hash in removed {
                inner.by_hash.remove(&hash);
                inner.blobs.remove(&hash);
                inner.size -= 1;
            }
        }
    }
}

/*
Stateless admission checks:
 1. The transaction type is activated on the current chain (spec-level
    validation, including chain id, signature shape, blob shape).
 2. For contract creations the initcode fits the EIP-3860 cap.
 3. The gas limit fits the head block's gas limit.
 4. maxFeePerGas covers maxPriorityFeePerGas.
 5. The gas limit covers the intrinsic gas of the payload.
 6. The fee cap clears the configured fraction of the head base fee.

Stateful admission checks:
 7. The signature recovers to a sender.
 8. The nonce is not below the account nonce.
 9. The sender can afford the worst-case cost `gas_limit * fee_cap +
    blob_gas * blob_fee_cap + value`.
*/
fn validate_transaction(tx: &Transaction, store: &Store) -> Result<Address, MempoolError> {
    let spec = store.chain_spec();
    let header = store.latest_header().ok_or(MempoolError::NoBlockHeader)?;
    let config = store.chain_spec().config();

    tx.validate(spec)?;

    if config.is_shanghai_activated(header.timestamp)
        && tx.is_contract_creation()
        && tx.data().len() > MAX_INITCODE_SIZE
    {
        return Err(MempoolError::InitCodeTooLarge);
    }

    if tx.gas_limit() > header.gas_limit {
        return Err(MempoolError::GasLimitExceeded);
    }

    if tx.max_priority_fee().unwrap_or(0) > tx.max_fee_per_gas().unwrap_or(u64::MAX) {
        return Err(MempoolError::InvalidTransaction(
            ethrun_core::types::InvalidTransaction::PriorityFeeGreaterThanMaxFee,
        ));
    }

    if tx.gas_limit() < transaction_intrinsic_gas(tx, &header, config)? {
        return Err(MempoolError::IntrinsicGasTooLow);
    }

    // Underpriced relative to the head base fee.
    if let Some(base_fee) = header.base_fee_per_gas {
        let floor = base_fee.saturating_mul(POOL_BASE_FEE_RATIO_PERCENT) / 100;
        if tx.gas_fee_cap() < floor {
            return Err(MempoolError::FeeBelowBase);
        }
    }

    let sender = tx.sender()?;

    let account_nonce = store.account_nonce(sender);
    if tx.nonce() < account_nonce {
        return Err(MempoolError::NonceTooLow {
            expected: account_nonce,
            got: tx.nonce(),
        });
    }

    if store.account_balance(sender) < tx.max_upfront_cost() {
        return Err(MempoolError::InsufficientFunds);
    }

    Ok(sender)
}

/// Intrinsic gas of a pooled transaction, mirroring what the EVM will charge
/// before execution. Duplicate access-list entries are charged per
/// occurrence.
pub fn transaction_intrinsic_gas(
    tx: &Transaction,
    header: &ethrun_core::types::BlockHeader,
    config: &ethrun_core::types::ChainConfig,
) -> Result<u64, MempoolError> {
    let is_contract_creation = tx.is_contract_creation();

    let mut gas = TX_GAS_COST;
    if is_contract_creation {
        gas = gas
            .checked_add(TX_CREATE_GAS_COST)
            .ok_or(MempoolError::GasOverflow)?;
    }

    let data_len = tx.data().len() as u64;
    if data_len > 0 {
        let non_zero_gas_cost = if config.is_istanbul_activated(header.number) {
            TX_DATA_NON_ZERO_GAS_EIP2028
        } else {
            TX_DATA_NON_ZERO_GAS
        };
        let non_zero_count = tx.data().iter().filter(|&&byte| byte != 0).count() as u64;

        gas = gas
            .checked_add(non_zero_count * non_zero_gas_cost)
            .ok_or(MempoolError::GasOverflow)?;
        gas = gas
            .checked_add((data_len - non_zero_count) * TX_DATA_ZERO_GAS_COST)
            .ok_or(MempoolError::GasOverflow)?;

        if is_contract_creation && config.is_shanghai_activated(header.timestamp) {
            let words = data_len.div_ceil(32);
            gas = gas
                .checked_add(words * TX_INIT_CODE_WORD_GAS_COST)
                .ok_or(MempoolError::GasOverflow)?;
        }
    }

    let storage_key_count: u64 = tx
        .access_list()
        .iter()
        .map(|(_, keys)| keys.len() as u64)
        .sum();
    gas = gas
        .checked_add(tx.access_list().len() as u64 * TX_ACCESS_LIST_ADDRESS_GAS)
        .and_then(|gas| gas.checked_add(storage_key_count * TX_ACCESS_LIST_STORAGE_KEY_GAS))
        .ok_or(MempoolError::GasOverflow)?;

    Ok(gas)
}

