use std::collections::HashMap;

use bytes::Bytes;
use ethereum_types::{H256, U256};
use keccak_hash::keccak;

/// In-VM account representation: code is materialized, storage is the set of
/// slots touched so far.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub balance: U256,
    pub bytecode: Bytes,
    pub nonce: u64,
}

impl AccountInfo {
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.bytecode.is_empty()
    }

    pub fn has_code(&self) -> bool {
        !self.bytecode.is_empty()
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Account {
    pub info: AccountInfo,
    pub storage: HashMap<H256, StorageSlot>,
}

/// A storage slot with the value it had at the start of the transaction,
/// needed for SSTORE net gas metering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageSlot {
    pub original_value: U256,
    pub current_value: U256,
}

impl Account {
    pub fn new(balance: U256, bytecode: Bytes, nonce: u64, storage: HashMap<H256, StorageSlot>) -> Self {
        Self {
            info: AccountInfo {
                balance,
                bytecode,
                nonce,
            },
            storage,
        }
    }

    pub fn bytecode_hash(&self) -> H256 {
        keccak(self.info.bytecode.as_ref())
    }

    pub fn has_code(&self) -> bool {
        self.info.has_code()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.info.balance = balance;
        self
    }

    pub fn with_bytecode(mut self, bytecode: Bytes) -> Self {
        self.info.bytecode = bytecode;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.info.nonce = nonce;
        self
    }

    pub fn with_storage(mut self, storage: HashMap<H256, StorageSlot>) -> Self {
        self.storage = storage;
        self
    }
}
