use std::collections::HashSet;

use bytes::Bytes;
use ethereum_types::{Address, U256};

use crate::constants::STACK_LIMIT;
use crate::errors::{InternalError, VMError};
use crate::memory::Memory;
use crate::opcodes::Opcode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    values: Vec<U256>,
}

impl Stack {
    pub fn pop(&mut self) -> Result<U256, VMError> {
        self.values.pop().ok_or(VMError::StackUnderflow)
    }

    /// Pops a value expected to fit in a usize (memory offsets and sizes).
    pub fn pop_usize(&mut self) -> Result<usize, VMError> {
        self.pop()?
            .try_into()
            .map_err(|_| VMError::VeryLargeNumber)
    }

    pub fn push(&mut self, value: U256) -> Result<(), VMError> {
        if self.values.len() >= STACK_LIMIT {
            return Err(VMError::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `depth` positions below the top.
    pub fn peek(&self, depth: usize) -> Result<U256, VMError> {
        let index = self
            .values
            .len()
            .checked_sub(depth + 1)
            .ok_or(VMError::StackUnderflow)?;
        Ok(self.values[index])
    }

    pub fn swap(&mut self, depth: usize) -> Result<(), VMError> {
        let top = self.values.len().checked_sub(1).ok_or(VMError::StackUnderflow)?;
        let other = top.checked_sub(depth).ok_or(VMError::StackUnderflow)?;
        self.values.swap(top, other);
        Ok(())
    }
}

/// A call frame, or execution environment: the context in which the EVM is
/// currently executing one message.
#[derive(Debug, Clone, Default)]
pub struct CallFrame {
    /// Max gas this frame may use.
    pub gas_limit: u64,
    /// Gas used so far in this context.
    pub gas_used: u64,
    pub pc: usize,
    /// Address that sent this message.
    pub msg_sender: Address,
    /// Recipient of the message (storage/balance context).
    pub to: Address,
    /// Address the executing code belongs to; differs from `to` for
    /// CALLCODE/DELEGATECALL.
    pub code_address: Address,
    pub bytecode: Bytes,
    pub msg_value: U256,
    pub stack: Stack,
    pub memory: Memory,
    /// Calldata. Empty for CREATE frames, where the payload is the initcode.
    pub calldata: Bytes,
    /// Return data produced by this context.
    pub output: Bytes,
    /// Return data of the most recent sub-context.
    pub sub_return_data: Bytes,
    pub is_static: bool,
    pub depth: usize,
    /// Offsets a JUMP/JUMPI may target.
    pub valid_jump_destinations: HashSet<usize>,
    /// Set for frames spawned by CREATE/CREATE2.
    pub create_op_called: bool,
}

impl CallFrame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        msg_sender: Address,
        to: Address,
        code_address: Address,
        bytecode: Bytes,
        msg_value: U256,
        calldata: Bytes,
        is_static: bool,
        gas_limit: u64,
        depth: usize,
        create_op_called: bool,
    ) -> Self {
        let valid_jump_destinations = valid_jump_destinations(&bytecode);
        Self {
            gas_limit,
            msg_sender,
            to,
            code_address,
            bytecode,
            msg_value,
            calldata,
            is_static,
            depth,
            valid_jump_destinations,
            create_op_called,
            ..Default::default()
        }
    }

    pub fn new_from_bytecode(bytecode: Bytes) -> Self {
        let valid_jump_destinations = valid_jump_destinations(&bytecode);
        Self {
            gas_limit: u64::MAX,
            bytecode,
            valid_jump_destinations,
            ..Default::default()
        }
    }

    /// Replaces the executing code (CREATE frames get their initcode here).
    pub fn assign_bytecode(&mut self, bytecode: Bytes) {
        self.valid_jump_destinations = valid_jump_destinations(&bytecode);
        self.bytecode = bytecode;
    }

    /// Byte under the program counter; STOP once past the end.
    pub fn current_opcode(&self) -> u8 {
        self.bytecode
            .get(self.pc)
            .copied()
            .unwrap_or(Opcode::STOP as u8)
    }

    pub fn increment_pc_by(&mut self, count: usize) -> Result<(), VMError> {
        self.pc = self
            .pc
            .checked_add(count)
            .ok_or(VMError::Internal(InternalError::PcOverflow))?;
        Ok(())
    }

    pub fn gas_remaining(&self) -> u64 {
        self.gas_limit.saturating_sub(self.gas_used)
    }
}

/// Collects the JUMPDEST offsets of `code`, skipping push payloads.
pub fn valid_jump_destinations(code: &Bytes) -> HashSet<usize> {
    let mut destinations = HashSet::new();
    let mut pc = 0;

    while let Some(&opcode) = code.get(pc) {
        if opcode == Opcode::JUMPDEST as u8 {
            destinations.insert(pc);
        } else if (Opcode::PUSH1 as u8..=Opcode::PUSH32 as u8).contains(&opcode) {
            pc += (opcode - Opcode::PUSH1 as u8) as usize + 1;
        }
        pc += 1;
    }

    destinations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jumpdest_inside_push_payload_is_not_valid() {
        // PUSH2 0x5b5b JUMPDEST
        let code = Bytes::from_static(&[0x61, 0x5b, 0x5b, 0x5b]);
        let destinations = valid_jump_destinations(&code);
        assert!(destinations.contains(&3));
        assert!(!destinations.contains(&1));
        assert!(!destinations.contains(&2));
    }

    #[test]
    fn stack_limits() {
        let mut stack = Stack::default();
        for i in 0..STACK_LIMIT {
            stack.push(U256::from(i)).unwrap();
        }
        assert_eq!(stack.push(U256::zero()), Err(VMError::StackOverflow));
        for _ in 0..STACK_LIMIT {
            stack.pop().unwrap();
        }
        assert_eq!(stack.pop(), Err(VMError::StackUnderflow));
    }

    #[test]
    fn stack_swap_and_peek() {
        let mut stack = Stack::default();
        stack.push(U256::from(1)).unwrap();
        stack.push(U256::from(2)).unwrap();
        stack.push(U256::from(3)).unwrap();
        stack.swap(2).unwrap();
        assert_eq!(stack.peek(0).unwrap(), U256::from(1));
        assert_eq!(stack.peek(2).unwrap(), U256::from(3));
    }
}
