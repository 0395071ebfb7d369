use ethereum_types::U256;

use crate::constants::{MEMORY_EXPANSION_QUOTIENT, WORD_SIZE};
use crate::errors::{InternalError, OutOfGasError, VMError};

/// Byte-addressed scratch memory of a call frame, grown in 32-byte words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn resize(&mut self, byte_size: usize) -> Result<(), VMError> {
        let target = byte_size
            .checked_next_multiple_of(WORD_SIZE)
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        if target > self.data.len() {
            self.data.resize(target, 0);
        }
        Ok(())
    }

    pub fn load_word(&mut self, offset: usize) -> Result<U256, VMError> {
        let end = offset
            .checked_add(WORD_SIZE)
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        self.resize(end)?;
        let bytes = self
            .data
            .get(offset..end)
            .ok_or(VMError::Internal(InternalError::SlicingError))?;
        Ok(U256::from_big_endian(bytes))
    }

    pub fn load_range(&mut self, offset: usize, size: usize) -> Result<Vec<u8>, VMError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(size)
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        self.resize(end)?;
        self.data
            .get(offset..end)
            .map(<[u8]>::to_vec)
            .ok_or(VMError::Internal(InternalError::SlicingError))
    }

    pub fn store_bytes(&mut self, offset: usize, value: &[u8]) -> Result<(), VMError> {
        if value.is_empty() {
            return Ok(());
        }
        let end = offset
            .checked_add(value.len())
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        self.resize(end)?;
        self.data
            .get_mut(offset..end)
            .ok_or(VMError::Internal(InternalError::SlicingError))?
            .copy_from_slice(value);
        Ok(())
    }

    pub fn store_word(&mut self, offset: usize, value: U256) -> Result<(), VMError> {
        let mut bytes = [0u8; WORD_SIZE];
        value.to_big_endian(&mut bytes);
        self.store_bytes(offset, &bytes)
    }

    pub fn copy_within(
        &mut self,
        src_offset: usize,
        dest_offset: usize,
        size: usize,
    ) -> Result<(), VMError> {
        if size == 0 {
            return Ok(());
        }
        let src_end = src_offset
            .checked_add(size)
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        let dest_end = dest_offset
            .checked_add(size)
            .ok_or(VMError::Internal(InternalError::ArithmeticOverflow))?;
        self.resize(src_end.max(dest_end))?;
        self.data.copy_within(src_offset..src_end, dest_offset);
        Ok(())
    }

    fn word_cost(byte_size: usize) -> Result<u64, OutOfGasError> {
        let words = (byte_size as u64)
            .checked_add(WORD_SIZE as u64 - 1)
            .ok_or(OutOfGasError::ArithmeticOperationOverflow)?
            / WORD_SIZE as u64;
        let quadratic = words
            .checked_mul(words)
            .ok_or(OutOfGasError::GasCostOverflow)?
            / MEMORY_EXPANSION_QUOTIENT;
        words
            .checked_mul(3)
            .and_then(|linear| linear.checked_add(quadratic))
            .ok_or(OutOfGasError::GasCostOverflow)
    }

    /// Gas for growing memory to cover `byte_size` bytes; zero when already
    /// large enough.
    pub fn expansion_cost(&self, byte_size: usize) -> Result<u64, OutOfGasError> {
        if byte_size <= self.data.len() {
            return Ok(0);
        }
        let new_cost = Self::word_cost(byte_size)?;
        let current_cost = Self::word_cost(self.data.len())?;
        Ok(new_cost.saturating_sub(current_cost))
    }

    /// Expansion cost of an (offset, size) access; zero-size accesses don't
    /// touch memory.
    pub fn access_cost(&self, offset: usize, size: usize) -> Result<u64, OutOfGasError> {
        if size == 0 {
            return Ok(0);
        }
        let end = offset
            .checked_add(size)
            .ok_or(OutOfGasError::ArithmeticOperationOverflow)?;
        self.expansion_cost(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_store_roundtrip() {
        let mut memory = Memory::new();
        memory.store_word(0, U256::from(0xdeadbeefu64)).unwrap();
        assert_eq!(memory.load_word(0).unwrap(), U256::from(0xdeadbeefu64));
        assert_eq!(memory.len(), 32);
    }

    #[test]
    fn expansion_cost_is_quadratic() {
        let memory = Memory::new();
        // First word: 3 gas linear.
        assert_eq!(memory.expansion_cost(32).unwrap(), 3);
        // 32 words: 32*3 + 32*32/512 = 98.
        assert_eq!(memory.expansion_cost(1024).unwrap(), 98);
        // Already-covered sizes cost nothing.
        let mut grown = Memory::new();
        grown.store_word(0, U256::one()).unwrap();
        assert_eq!(grown.expansion_cost(16).unwrap(), 0);
    }

    #[test]
    fn zero_size_access_is_free() {
        let memory = Memory::new();
        assert_eq!(memory.access_cost(usize::MAX, 0).unwrap(), 0);
    }

    #[test]
    fn copy_within_overlapping() {
        let mut memory = Memory::new();
        memory.store_bytes(0, &[1, 2, 3, 4]).unwrap();
        memory.copy_within(0, 2, 4).unwrap();
        assert_eq!(memory.load_range(0, 6).unwrap(), vec![1, 2, 1, 2, 3, 4]);
    }
}
