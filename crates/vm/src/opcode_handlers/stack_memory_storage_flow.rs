use ethereum_types::{H256, U256};

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, OutOfGasError, VMError};
use crate::gas_cost;
use crate::vm::VM;

// Stack, Memory, Storage and Flow Operations (15)
// Opcodes: POP, MLOAD, MSTORE, MSTORE8, SLOAD, SSTORE, JUMP, JUMPI, PC,
//          MSIZE, GAS, JUMPDEST, TLOAD, TSTORE, MCOPY

impl VM {
    pub fn op_stop(&mut self, _current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        Ok(OpcodeSuccess::Result(crate::errors::ResultReason::Stop))
    }

    pub fn op_pop(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::POP)?;
        current_call_frame.stack.pop()?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mload(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let memory_expansion = current_call_frame.memory.access_cost(offset, 32)?;
        self.increase_consumed_gas(current_call_frame, gas_cost::MLOAD_STATIC + memory_expansion)?;

        let value = current_call_frame.memory.load_word(offset)?;
        current_call_frame.stack.push(value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mstore(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let value = current_call_frame.stack.pop()?;
        let memory_expansion = current_call_frame.memory.access_cost(offset, 32)?;
        self.increase_consumed_gas(current_call_frame, gas_cost::MSTORE_STATIC + memory_expansion)?;

        current_call_frame.memory.store_word(offset, value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mstore8(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let value = current_call_frame.stack.pop()?;
        let memory_expansion = current_call_frame.memory.access_cost(offset, 1)?;
        self.increase_consumed_gas(current_call_frame, gas_cost::MSTORE_STATIC + memory_expansion)?;

        current_call_frame
            .memory
            .store_bytes(offset, &[value.byte(0)])?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sload(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let key = current_call_frame.stack.pop()?;
        let mut key_bytes = [0u8; 32];
        key.to_big_endian(&mut key_bytes);
        let key = H256::from(key_bytes);

        let address = current_call_frame.to;
        let (slot, cold) = self.access_storage_slot(address, key);
        self.increase_consumed_gas(current_call_frame, gas_cost::sload(&self.env.config, cold))?;

        current_call_frame.stack.push(slot.current_value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sstore(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let key = current_call_frame.stack.pop()?;
        let new_value = current_call_frame.stack.pop()?;
        let mut key_bytes = [0u8; 32];
        key.to_big_endian(&mut key_bytes);
        let key = H256::from(key_bytes);

        // EIP-2200 sentry: refuse to run on nearly-empty gas.
        if self.env.config.gte(ethrun_core::types::Fork::Istanbul)
            && current_call_frame.gas_remaining() <= gas_cost::SSTORE_SENTRY
        {
            return Err(VMError::OutOfGas(OutOfGasError::MaxGasLimitExceeded));
        }

        let address = current_call_frame.to;
        let (slot, cold) = self.access_storage_slot(address, key);
        let pricing = gas_cost::sstore(
            &self.env.config,
            slot.original_value,
            slot.current_value,
            new_value,
            cold,
        );
        self.increase_consumed_gas(current_call_frame, pricing.cost)?;
        if pricing.refund_add > 0 {
            self.state.add_refund(pricing.refund_add);
        }
        if pricing.refund_sub > 0 {
            self.state.sub_refund(pricing.refund_sub)?;
        }

        self.state.set_storage(address, key, new_value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_jump(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::JUMP)?;
        let target = current_call_frame.stack.pop_usize()?;
        if !current_call_frame.valid_jump_destinations.contains(&target) {
            return Err(VMError::InvalidJump);
        }
        current_call_frame.pc = target;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_jumpi(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::JUMPI)?;
        let target = current_call_frame.stack.pop()?;
        let condition = current_call_frame.stack.pop()?;
        if condition.is_zero() {
            current_call_frame.increment_pc_by(1)?;
            return Ok(OpcodeSuccess::Continue);
        }
        let target: usize = target.try_into().map_err(|_| VMError::InvalidJump)?;
        if !current_call_frame.valid_jump_destinations.contains(&target) {
            return Err(VMError::InvalidJump);
        }
        current_call_frame.pc = target;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_pc(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.pc))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_msize(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.memory.len()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_gas(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.gas_remaining()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_jumpdest(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::JUMPDEST)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_tload(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::TLOAD)?;
        let key = current_call_frame.stack.pop()?;
        let value = self.transient.get(current_call_frame.to, key);
        current_call_frame.stack.push(value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_tstore(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }
        self.increase_consumed_gas(current_call_frame, gas_cost::TSTORE)?;
        let key = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;
        self.transient.set(current_call_frame.to, key, value);
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mcopy(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let dest_offset = current_call_frame.stack.pop_usize()?;
        let src_offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let expansion_src = current_call_frame.memory.access_cost(src_offset, size)?;
        let expansion_dest = current_call_frame.memory.access_cost(dest_offset, size)?;
        let gas = gas_cost::copy(expansion_src.max(expansion_dest), size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        current_call_frame
            .memory
            .copy_within(src_offset, dest_offset, size)?;
        Ok(OpcodeSuccess::Continue)
    }
}
