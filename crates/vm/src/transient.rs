use ethereum_types::{Address, U256};
use std::collections::HashMap;

use crate::errors::{InternalError, VMError};

/// EIP-1153 transient storage: a per-transaction scratch key-value store
/// with checkpoint/commit/revert mirroring the state journal, on its own
/// stack. Cleared when the transaction ends.
#[derive(Debug, Clone, Default)]
pub struct TransientStorage {
    values: HashMap<(Address, U256), U256>,
    entries: Vec<((Address, U256), Option<U256>)>,
    checkpoints: Vec<usize>,
}

impl TransientStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: Address, key: U256) -> U256 {
        self.values
            .get(&(address, key))
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, address: Address, key: U256, value: U256) {
        let previous = self.values.insert((address, key), value);
        self.entries.push(((address, key), previous));
    }

    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.entries.len());
    }

    pub fn commit(&mut self) -> Result<(), VMError> {
        self.checkpoints
            .pop()
            .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
        Ok(())
    }

    pub fn revert(&mut self) -> Result<(), VMError> {
        let mark = self
            .checkpoints
            .pop()
            .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
        while self.entries.len() > mark {
            let ((address, key), previous) = self
                .entries
                .pop()
                .ok_or(VMError::Internal(InternalError::JournalUnbalanced))?;
            match previous {
                Some(value) => {
                    self.values.insert((address, key), value);
                }
                None => {
                    self.values.remove(&(address, key));
                }
            }
        }
        Ok(())
    }

    /// End-of-transaction wipe.
    pub fn clear(&mut self) {
        self.values.clear();
        self.entries.clear();
        self.checkpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_revert_with_the_frame() {
        let address = Address::repeat_byte(0x01);
        let mut transient = TransientStorage::new();

        transient.set(address, U256::one(), U256::from(10));
        transient.checkpoint();
        transient.set(address, U256::one(), U256::from(20));
        transient.set(address, U256::from(2), U256::from(30));
        transient.revert().unwrap();

        assert_eq!(transient.get(address, U256::one()), U256::from(10));
        assert_eq!(transient.get(address, U256::from(2)), U256::zero());
    }

    #[test]
    fn commit_keeps_values() {
        let address = Address::repeat_byte(0x02);
        let mut transient = TransientStorage::new();

        transient.checkpoint();
        transient.set(address, U256::zero(), U256::from(1));
        transient.commit().unwrap();
        assert_eq!(transient.get(address, U256::zero()), U256::from(1));
    }

    #[test]
    fn clear_wipes_everything() {
        let address = Address::repeat_byte(0x03);
        let mut transient = TransientStorage::new();
        transient.set(address, U256::zero(), U256::from(9));
        transient.clear();
        assert_eq!(transient.get(address, U256::zero()), U256::zero());
    }

    #[test]
    fn unbalanced_stack_is_detected(){
        let mut transient = TransientStorage::new();
        assert!(transient.revert().is_err());
        assert!(transient.commit().is_err());
    }
}
