//! In-memory chain store backing the mempool and the payload builder: block
//! bodies and headers by hash/number, the canonical chain, receipts and a
//! flat world state the VM reads through its `Database` interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ethrun_core::chain_spec::ChainSpec;
use ethrun_core::types::{Block, BlockHash, BlockHeader, BlockNumber, Receipt};
use ethrun_vm::account::{Account, AccountInfo, StorageSlot};
use ethrun_vm::db::Database;

#[derive(Default)]
struct StoreInner {
    blocks: HashMap<BlockHash, Block>,
    canonical: HashMap<BlockNumber, BlockHash>,
    total_difficulty: HashMap<BlockHash, U256>,
    receipts: HashMap<BlockHash, Vec<Receipt>>,
    latest: Option<BlockHash>,
    world: HashMap<Address, Account>,
}

/// Shared handle over the chain data; clones see the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    spec: Arc<ChainSpec>,
}

impl Store {
    pub fn new(spec: ChainSpec) -> Self {
        Self {
            inner: Default::default(),
            spec: Arc::new(spec),
        }
    }

    pub fn chain_spec(&self) -> &ChainSpec {
        &self.spec
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // A poisoned store lock means a writer panicked mid-update; there is
        // no meaningful recovery.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== blocks =====

    pub fn add_block(&self, block: Block) {
        let hash = block.hash();
        let parent_td = self
            .get_total_difficulty(block.header.parent_hash)
            .unwrap_or_default();
        let mut inner = self.lock();
        inner
            .total_difficulty
            .insert(hash, parent_td + block.header.difficulty);
        inner.blocks.insert(hash, block);
    }

    pub fn get_block(&self, hash: BlockHash) -> Option<Block> {
        self.lock().blocks.get(&hash).cloned()
    }

    pub fn get_block_by_number(&self, number: BlockNumber) -> Option<Block> {
        let inner = self.lock();
        let hash = inner.canonical.get(&number)?;
        inner.blocks.get(hash).cloned()
    }

    pub fn get_block_header(&self, hash: BlockHash) -> Option<BlockHeader> {
        self.lock().blocks.get(&hash).map(|block| block.header.clone())
    }

    pub fn get_total_difficulty(&self, hash: BlockHash) -> Option<U256> {
        self.lock().total_difficulty.get(&hash).copied()
    }

    pub fn set_canonical(&self, block: &Block) {
        let hash = block.hash();
        let mut inner = self.lock();
        inner.canonical.insert(block.header.number, hash);
        inner.latest = Some(hash);
    }

    pub fn latest_block_hash(&self) -> Option<BlockHash> {
        self.lock().latest
    }

    pub fn latest_header(&self) -> Option<BlockHeader> {
        let inner = self.lock();
        let hash = inner.latest?;
        inner.blocks.get(&hash).map(|block| block.header.clone())
    }

    pub fn add_receipts(&self, block_hash: BlockHash, receipts: Vec<Receipt>) {
        self.lock().receipts.insert(block_hash, receipts);
    }

    pub fn get_receipts(&self, block_hash: BlockHash) -> Option<Vec<Receipt>> {
        self.lock().receipts.get(&block_hash).cloned()
    }

    // ===== world state =====

    pub fn set_account(&self, address: Address, account: Account) {
        self.lock().world.insert(address, account);
    }

    pub fn get_account(&self, address: Address) -> Option<Account> {
        self.lock().world.get(&address).cloned()
    }

    pub fn account_nonce(&self, address: Address) -> u64 {
        self.lock()
            .world
            .get(&address)
            .map(|account| account.info.nonce)
            .unwrap_or_default()
    }

    pub fn account_balance(&self, address: Address) -> U256 {
        self.lock()
            .world
            .get(&address)
            .map(|account| account.info.balance)
            .unwrap_or_default()
    }

    /// Applies the account cache produced by an executed block back into the
    /// flat world state.
    pub fn apply_account_updates(&self, updates: &HashMap<Address, Account>) {
        let mut inner = self.lock();
        for (address, account) in updates {
            let entry = inner.world.entry(*address).or_default();
            entry.info = account.info.clone();
            for (key, slot) in &account.storage {
                entry.storage.insert(
                    *key,
                    StorageSlot {
                        original_value: slot.current_value,
                        current_value: slot.current_value,
                    },
                );
            }
        }
    }

    pub fn fund_account(&self, address: Address, balance: U256) {
        let mut inner = self.lock();
        inner.world.entry(address).or_default().info.balance = balance;
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        let mut inner = self.lock();
        let entry = inner.world.entry(address).or_default();
        entry.info.bytecode = code;
    }
}

impl Database for Store {
    fn get_account_info(&self, address: Address) -> AccountInfo {
        self.lock()
            .world
            .get(&address)
            .map(|account| account.info.clone())
            .unwrap_or_default()
    }

    fn get_storage_slot(&self, address: Address, key: H256) -> U256 {
        self.lock()
            .world
            .get(&address)
            .and_then(|account| account.storage.get(&key))
            .map(|slot| slot.current_value)
            .unwrap_or_default()
    }

    fn get_block_hash(&self, block_number: u64) -> Option<H256> {
        self.lock().canonical.get(&block_number).copied()
    }
}
