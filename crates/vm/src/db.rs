use crate::account::{Account, AccountInfo, StorageSlot};
use ethereum_types::{Address, H256, U256};
use std::collections::HashMap;

/// Read-only view of the world state consumed by the VM. Implemented by the
/// storage layer; the VM never writes through it directly, mutations flow
/// through the journal and are handed back as account updates.
pub trait Database {
    fn get_account_info(&self, address: Address) -> AccountInfo;
    fn get_storage_slot(&self, address: Address, key: H256) -> U256;
    fn get_block_hash(&self, block_number: u64) -> Option<H256>;
}

/// In-memory database used by tests and the dev chain.
#[derive(Debug, Default)]
pub struct Db {
    pub accounts: HashMap<Address, Account>,
    pub block_hashes: HashMap<u64, H256>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_accounts(&mut self, accounts: Vec<(Address, Account)>) {
        self.accounts.extend(accounts);
    }

    pub fn add_block_hashes(&mut self, block_hashes: Vec<(u64, H256)>) {
        self.block_hashes.extend(block_hashes);
    }

    pub fn with_accounts(mut self, accounts: HashMap<Address, Account>) -> Self {
        self.accounts = accounts;
        self
    }
}

impl Database for Db {
    fn get_account_info(&self, address: Address) -> AccountInfo {
        self.accounts
            .get(&address)
            .map(|account| account.info.clone())
            .unwrap_or_default()
    }

    fn get_storage_slot(&self, address: Address, key: H256) -> U256 {
        self.accounts
            .get(&address)
            .and_then(|account| account.storage.get(&key))
            .map(|slot| slot.original_value)
            .unwrap_or_default()
    }

    fn get_block_hash(&self, block_number: u64) -> Option<H256> {
        self.block_hashes.get(&block_number).copied()
    }
}

// Used by tests building storage maps out of plain values.
pub fn storage_slot(value: U256) -> StorageSlot {
    StorageSlot {
        original_value: value,
        current_value: value,
    }
}
