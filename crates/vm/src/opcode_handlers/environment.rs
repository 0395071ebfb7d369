use ethereum_types::U256;

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::vm::{address_to_word, word_to_address, VM};

// Environmental Information (16)
// Opcodes: ADDRESS, BALANCE, ORIGIN, CALLER, CALLVALUE, CALLDATALOAD,
//          CALLDATASIZE, CALLDATACOPY, CODESIZE, CODECOPY, GASPRICE,
//          EXTCODESIZE, EXTCODECOPY, RETURNDATASIZE, RETURNDATACOPY,
//          EXTCODEHASH

impl VM {
    pub fn op_address(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(address_to_word(current_call_frame.to))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_balance(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let address = word_to_address(current_call_frame.stack.pop()?);
        let (account_info, cold) = self.access_account(address);
        self.increase_consumed_gas(current_call_frame, gas_cost::balance(&self.env.config, cold))?;
        current_call_frame.stack.push(account_info.balance)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_origin(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(address_to_word(self.env.origin))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_caller(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(address_to_word(current_call_frame.msg_sender))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_callvalue(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(current_call_frame.msg_value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_calldataload(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::CALLDATALOAD)?;
        let offset = current_call_frame.stack.pop()?;

        // Reads past the calldata end fill with zeros.
        let mut word = [0u8; 32];
        if offset < U256::from(current_call_frame.calldata.len()) {
            let offset = offset.low_u64() as usize;
            let available = current_call_frame.calldata.len() - offset;
            let count = available.min(32);
            word[..count].copy_from_slice(&current_call_frame.calldata[offset..offset + count]);
        }
        current_call_frame.stack.push(U256::from_big_endian(&word))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_calldatasize(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.calldata.len()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_calldatacopy(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let dest_offset = current_call_frame.stack.pop_usize()?;
        let calldata_offset = current_call_frame.stack.pop()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(dest_offset, size)?;
        let gas = gas_cost::copy(memory_expansion, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        let data = copy_with_zero_fill(&current_call_frame.calldata, calldata_offset, size);
        current_call_frame.memory.store_bytes(dest_offset, &data)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_codesize(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.bytecode.len()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_codecopy(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let dest_offset = current_call_frame.stack.pop_usize()?;
        let code_offset = current_call_frame.stack.pop()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(dest_offset, size)?;
        let gas = gas_cost::copy(memory_expansion, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        let data = copy_with_zero_fill(&current_call_frame.bytecode, code_offset, size);
        current_call_frame.memory.store_bytes(dest_offset, &data)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_gasprice(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame.stack.push(self.env.gas_price)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_extcodesize(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let address = word_to_address(current_call_frame.stack.pop()?);
        let (account_info, cold) = self.access_account(address);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::ext_code_access(&self.env.config, cold),
        )?;
        current_call_frame
            .stack
            .push(U256::from(account_info.bytecode.len()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_extcodecopy(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let address = word_to_address(current_call_frame.stack.pop()?);
        let dest_offset = current_call_frame.stack.pop_usize()?;
        let code_offset = current_call_frame.stack.pop()?;
        let size = current_call_frame.stack.pop_usize()?;

        let (account_info, cold) = self.access_account(address);
        let memory_expansion = current_call_frame.memory.access_cost(dest_offset, size)?;
        let gas = gas_cost::ext_code_copy(&self.env.config, cold, memory_expansion, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        let data = copy_with_zero_fill(&account_info.bytecode, code_offset, size);
        current_call_frame.memory.store_bytes(dest_offset, &data)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_returndatasize(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::QUICK_STEP)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.sub_return_data.len()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_returndatacopy(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let dest_offset = current_call_frame.stack.pop_usize()?;
        let data_offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(dest_offset, size)?;
        let gas = gas_cost::copy(memory_expansion, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        // Unlike the other copies, out-of-bounds return-data reads fault.
        let end = data_offset
            .checked_add(size)
            .ok_or(VMError::VeryLargeNumber)?;
        if end > current_call_frame.sub_return_data.len() {
            return Err(VMError::ReturnDataOutOfBounds);
        }
        let data = current_call_frame.sub_return_data[data_offset..end].to_vec();
        current_call_frame.memory.store_bytes(dest_offset, &data)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_extcodehash(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let address = word_to_address(current_call_frame.stack.pop()?);
        let (account_info, cold) = self.access_account(address);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::ext_code_access(&self.env.config, cold),
        )?;

        // Empty accounts hash to zero, accounts without code to keccak("").
        let hash = if account_info.is_empty() {
            U256::zero()
        } else {
            let digest = keccak_hash::keccak(account_info.bytecode.as_ref());
            U256::from_big_endian(digest.as_bytes())
        };
        current_call_frame.stack.push(hash)?;
        Ok(OpcodeSuccess::Continue)
    }
}

/// Copies `size` bytes starting at `offset`, padding reads past the end with
/// zeros (the CALLDATACOPY/CODECOPY/EXTCODECOPY semantics).
fn copy_with_zero_fill(source: &[u8], offset: U256, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    if offset < U256::from(source.len()) {
        let offset = offset.low_u64() as usize;
        let available = (source.len() - offset).min(size);
        out[..available].copy_from_slice(&source[offset..offset + available]);
    }
    out
}
