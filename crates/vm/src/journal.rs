use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use ethrun_core::types::Log;

use crate::account::{Account, AccountInfo, StorageSlot};
use crate::db::Database;
use crate::errors::{InternalError, VMError};

/// One undoable state mutation. Reads never journal; cache fills from the
/// backing database are not mutations.
#[derive(Debug, Clone)]
enum JournalEntry {
    InfoUpdate {
        address: Address,
        previous: AccountInfo,
    },
    StorageUpdate {
        address: Address,
        key: H256,
        previous: Option<StorageSlot>,
    },
    AccountReplaced {
        address: Address,
        previous: Option<Account>,
    },
    LogAppended,
    RefundSet {
        previous: u64,
    },
    AddressWarmed {
        address: Address,
    },
    SlotWarmed {
        address: Address,
        key: H256,
    },
    SelfdestructMarked {
        address: Address,
    },
    AccountCreated {
        address: Address,
    },
}

/// Journaled view of the world state owned by one EVM call stack.
///
/// All mutations push an undo entry; [`checkpoint`](Self::checkpoint) marks a
/// frame boundary, [`commit`](Self::commit) merges the entries into the
/// parent frame and [`revert`](Self::revert) undoes them in LIFO order.
/// Warm sets, refunds, logs and the EIP-6780 bookkeeping are scoped to one
/// transaction and cleared by [`finish_transaction`](Self::finish_transaction).
pub struct JournaledState {
    db: Arc<dyn Database>,
    accounts: HashMap<Address, Account>,
    entries: Vec<JournalEntry>,
    checkpoints: Vec<usize>,
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<(Address, H256)>,
    refund: u64,
    logs: Vec<Log>,
    selfdestructs: HashSet<Address>,
    created: HashSet<Address>,
}

impl JournaledState {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            accounts: HashMap::new(),
            entries: Vec::new(),
            checkpoints: Vec::new(),
            warm_addresses: HashSet::new(),
            warm_slots: HashSet::new(),
            refund: 0,
            logs: Vec::new(),
            selfdestructs: HashSet::new(),
            created: HashSet::new(),
        }
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// The materialized account cache, consumed by the storage layer to
    /// produce account updates after a transaction.
    pub fn cache(&self) -> &HashMap<Address, Account> {
        &self.accounts
    }

    // ===== reads =====

    /// Reads an account, pulling it into the cache on first touch.
    pub fn get_account(&mut self, address: Address) -> &Account {
        self.accounts.entry(address).or_insert_with(|| Account {
            info: self.db.get_account_info(address),
            storage: HashMap::new(),
        })
    }

    pub fn get_account_info(&mut self, address: Address) -> AccountInfo {
        self.get_account(address).info.clone()
    }

    /// Reads a storage slot, pulling the original value into the slot cache
    /// on first touch.
    pub fn get_storage_slot(&mut self, address: Address, key: H256) -> StorageSlot {
        let original = self.db.get_storage_slot(address, key);
        let account = self.accounts.entry(address).or_insert_with(|| Account {
            info: self.db.get_account_info(address),
            storage: HashMap::new(),
        });
        *account.storage.entry(key).or_insert(StorageSlot {
            original_value: original,
            current_value: original,
        })
    }

    pub fn get_block_hash(&self, block_number: u64) -> Option<H256> {
        self.db.get_block_hash(block_number)
    }

    // ===== mutations =====

    fn journal_info(&mut self, address: Address) {
        let previous = self.get_account(address).info.clone();
        self.entries.push(JournalEntry::InfoUpdate { address, previous });
    }

    pub fn increase_balance(&mut self, address: Address, amount: U256) -> Result<(), VMError> {
        self.journal_info(address);
        let account = self.account_mut(address)?;
        account.info.balance = account
            .info
            .balance
            .checked_add(amount)
            .ok_or(VMError::BalanceOverflow)?;
        Ok(())
    }

    pub fn decrease_balance(&mut self, address: Address, amount: U256) -> Result<(), VMError> {
        self.journal_info(address);
        let account = self.account_mut(address)?;
        account.info.balance = account
            .info
            .balance
            .checked_sub(amount)
            .ok_or(VMError::BalanceUnderflow)?;
        Ok(())
    }

    pub fn increment_nonce(&mut self, address: Address) -> Result<u64, VMError> {
        self.journal_info(address);
        let account = self.account_mut(address)?;
        account.info.nonce = account
            .info
            .nonce
            .checked_add(1)
            .ok_or(VMError::NonceOverflow)?;
        Ok(account.info.nonce)
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), VMError> {
        self.journal_info(address);
        let account = self.account_mut(address)?;
        account.info.bytecode = code;
        Ok(())
    }

    /// Replaces an account wholesale (contract creation clears storage).
    pub fn put_account(&mut self, address: Address, account: Account) {
        let previous = self.accounts.insert(address, account);
        self.entries
            .push(JournalEntry::AccountReplaced { address, previous });
    }

    /// Removes an account from the cached state (selfdestruct sweep).
    pub fn delete_account(&mut self, address: Address) {
        let previous = self
            .accounts
            .insert(address, Account::default());
        self.entries
            .push(JournalEntry::AccountReplaced { address, previous });
    }

    pub fn set_storage(&mut self, address: Address, key: H256, value: U256) -> Result<(), VMError> {
        // Make sure the original value is cached before overwriting.
        let slot = self.get_storage_slot(address, key);
        let account = self.account_mut(address)?;
        let previous = account.storage.insert(
            key,
            StorageSlot {
                original_value: slot.original_value,
                current_value: value,
            },
        );
        self.entries.push(JournalEntry::StorageUpdate {
            address,
            key,
            previous,
        });
        Ok(())
    }

    pub fn add_log(&mut self, log: Log) {
        self.logs.push(log);
        self.entries.push(JournalEntry::LogAppended);
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn refund(&self) -> u64 {
        self.refund
    }

    pub fn add_refund(&mut self, amount: u64) {
        self.entries.push(JournalEntry::RefundSet {
            previous: self.refund,
        });
        self.refund = self.refund.saturating_add(amount);
    }

    pub fn sub_refund(&mut self, amount: u64) -> Result<(), VMError> {
        self.entries.push(JournalEntry::RefundSet {
            previous: self.refund,
        });
        self.refund = self
            .refund
            .checked_sub(amount)
            .ok_or(VMError::RefundUnderflow)?;
        Ok(())
    }

    /// Marks the address warm. Returns whether it was cold before.
    pub fn warm_address(&mut self, address: Address) -> bool {
        let was_cold = self.warm_addresses.insert(address);
        if was_cold {
            self.entries.push(JournalEntry::AddressWarmed { address });
        }
        was_cold
    }

    /// Marks the slot warm. Returns whether it was cold before.
    pub fn warm_slot(&mut self, address: Address, key: H256) -> bool {
        let was_cold = self.warm_slots.insert((address, key));
        if was_cold {
            self.entries.push(JournalEntry::SlotWarmed { address, key });
        }
        was_cold
    }

    pub fn is_warm_address(&self, address: Address) -> bool {
        self.warm_addresses.contains(&address)
    }

    pub fn is_warm_slot(&self, address: Address, key: H256) -> bool {
        self.warm_slots.contains(&(address, key))
    }

    pub fn mark_selfdestruct(&mut self, address: Address) {
        if self.selfdestructs.insert(address) {
            self.entries
                .push(JournalEntry::SelfdestructMarked { address });
        }
    }

    pub fn selfdestructs(&self) -> &HashSet<Address> {
        &self.selfdestructs
    }

    pub fn mark_created(&mut self, address: Address) {
        if self.created.insert(address) {
            self.entries.push(JournalEntry::AccountCreated { address });
        }
    }

    /// Whether the address was created by the current transaction
    /// (EIP-6780: only those are actually destroyed by SELFDESTRUCT).
    pub fn is_created(&self, address: Address) -> bool {
        self.created.contains(&address)
    }

    pub fn created_accounts(&self) -> &HashSet<Address> {
        &self.created
    }

    fn account_mut(&mut self, address: Address) -> Result<&mut Account, VMError> {
        self.accounts
            .get_mut(&address)
            .ok_or(VMError::Internal(InternalError::AccountNotFound))
    }

    // ===== checkpointing =====

    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.entries.len());
    }

    /// Merges everything since the last checkpoint into the parent frame.
    pub fn commit(&mut self) -> Result<(), VMError> {
        self.checkpoints
            .pop()
            .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
        Ok(())
    }

    /// Undoes everything since the last checkpoint, newest first.
    pub fn revert(&mut self) -> Result<(), VMError> {
        let mark = self
            .checkpoints
            .pop()
            .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
        while self.entries.len() > mark {
            let entry = self
                .entries
                .pop()
                .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
            self.undo(entry);
        }
        Ok(())
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::InfoUpdate { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.info = previous;
                }
            }
            JournalEntry::StorageUpdate {
                address,
                key,
                previous,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    match previous {
                        Some(slot) => {
                            account.storage.insert(key, slot);
                        }
                        None => {
                            account.storage.remove(&key);
                        }
                    }
                }
            }
            JournalEntry::AccountReplaced { address, previous } => match previous {
                Some(account) => {
                    self.accounts.insert(address, account);
                }
                None => {
                    self.accounts.remove(&address);
                }
            },
            JournalEntry::LogAppended => {
                self.logs.pop();
            }
            JournalEntry::RefundSet { previous } => {
                self.refund = previous;
            }
            JournalEntry::AddressWarmed { address } => {
                self.warm_addresses.remove(&address);
            }
            JournalEntry::SlotWarmed { address, key } => {
                self.warm_slots.remove(&(address, key));
            }
            JournalEntry::SelfdestructMarked { address } => {
                self.selfdestructs.remove(&address);
            }
            JournalEntry::AccountCreated { address } => {
                self.created.remove(&address);
            }
        }
    }

    /// Ends the transaction scope: drains logs and per-tx sets, drops the
    /// journal. The account cache survives so subsequent transactions in the
    /// same block see the mutated state.
    pub fn finish_transaction(&mut self) -> (Vec<Log>, HashSet<Address>, HashSet<Address>) {
        self.entries.clear();
        self.checkpoints.clear();
        self.warm_addresses.clear();
        self.warm_slots.clear();
        self.refund = 0;
        (
            std::mem::take(&mut self.logs),
            std::mem::take(&mut self.selfdestructs),
            std::mem::take(&mut self.created),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn state_with(address: Address, balance: u64) -> JournaledState {
        let mut db = Db::new();
        db.add_accounts(vec![(
            address,
            Account::default().with_balance(balance.into()),
        )]);
        JournaledState::new(Arc::new(db))
    }

    #[test]
    fn revert_restores_balances_and_storage() {
        let address = Address::repeat_byte(0x01);
        let mut state = state_with(address, 100);

        state.checkpoint();
        state.increase_balance(address, 50.into()).unwrap();
        state
            .set_storage(address, H256::zero(), U256::from(7))
            .unwrap();
        assert_eq!(state.get_account_info(address).balance, 150.into());

        state.revert().unwrap();
        assert_eq!(state.get_account_info(address).balance, 100.into());
        assert_eq!(
            state.get_storage_slot(address, H256::zero()).current_value,
            U256::zero()
        );
    }

    #[test]
    fn commit_keeps_changes_for_outer_revert() {
        let address = Address::repeat_byte(0x02);
        let mut state = state_with(address, 10);

        state.checkpoint();
        state.increase_balance(address, 1.into()).unwrap();
        state.checkpoint();
        state.increase_balance(address, 2.into()).unwrap();
        state.commit().unwrap();
        // Outer revert undoes the committed inner frame too.
        state.revert().unwrap();
        assert_eq!(state.get_account_info(address).balance, 10.into());
    }

    #[test]
    fn nested_revert_is_scoped() {
        let address = Address::repeat_byte(0x03);
        let mut state = state_with(address, 0);

        state.checkpoint();
        state.increase_balance(address, 1.into()).unwrap();
        state.checkpoint();
        state.increase_balance(address, 100.into()).unwrap();
        state.revert().unwrap();
        state.commit().unwrap();
        assert_eq!(state.get_account_info(address).balance, 1.into());
    }

    #[test]
    fn unbalanced_journal_is_detected() {
        let mut state = state_with(Address::zero(), 0);
        assert!(matches!(
            state.commit(),
            Err(VMError::Internal(InternalError::JournalUnbalanced))
        ));
        assert!(matches!(
            state.revert(),
            Err(VMError::Internal(InternalError::JournalUnbalanced))
        ));
    }

    #[test]
    fn logs_and_refunds_disappear_on_revert() {
        let address = Address::repeat_byte(0x04);
        let mut state = state_with(address, 0);

        state.checkpoint();
        state.add_log(Log {
            address,
            topics: vec![],
            data: Default::default(),
        });
        state.add_refund(4800);
        assert_eq!(state.logs().len(), 1);
        assert_eq!(state.refund(), 4800);

        state.revert().unwrap();
        assert!(state.logs().is_empty());
        assert_eq!(state.refund(), 0);
    }

    #[test]
    fn warm_sets_are_reverted_with_the_frame() {
        let address = Address::repeat_byte(0x05);
        let mut state = state_with(address, 0);

        assert!(state.warm_address(address));
        state.checkpoint();
        let other = Address::repeat_byte(0x06);
        assert!(state.warm_address(other));
        assert!(!state.warm_address(other));
        state.revert().unwrap();

        assert!(state.is_warm_address(address));
        assert!(!state.is_warm_address(other));
    }

    #[test]
    fn created_set_tracks_eip6780() {
        let address = Address::repeat_byte(0x07);
        let mut state = state_with(address, 0);

        state.checkpoint();
        state.mark_created(address);
        assert!(state.is_created(address));
        state.revert().unwrap();
        assert!(!state.is_created(address));
    }

    #[test]
    fn finish_transaction_resets_tx_scope_but_keeps_state() {
        let address = Address::repeat_byte(0x08);
        let mut state = state_with(address, 5);

        state.checkpoint();
        state.increase_balance(address, 5.into()).unwrap();
        state.warm_address(address);
        state.add_refund(100);
        state.commit().unwrap();

        let (logs, selfdestructs, created) = state.finish_transaction();
        assert!(logs.is_empty() && selfdestructs.is_empty() && created.is_empty());
        assert!(!state.is_warm_address(address));
        assert_eq!(state.refund(), 0);
        // The mutated balance survives into the next transaction.
        assert_eq!(state.get_account_info(address).balance, 10.into());
    }
}
