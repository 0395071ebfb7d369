use ethereum_types::U256;

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, ResultReason, VMError};
use crate::gas_cost;
use crate::vm::{word_to_address, VM};

// System Operations (10)
// Opcodes: CREATE, CALL, CALLCODE, RETURN, DELEGATECALL, CREATE2, STATICCALL,
//          REVERT, INVALID, SELFDESTRUCT

impl VM {
    pub fn op_call(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let gas_for_call = current_call_frame.stack.pop()?;
        let callee = word_to_address(current_call_frame.stack.pop()?);
        let value_to_transfer = current_call_frame.stack.pop()?;

        if current_call_frame.is_static && !value_to_transfer.is_zero() {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let args_offset = current_call_frame.stack.pop_usize()?;
        let args_size = current_call_frame.stack.pop_usize()?;
        let return_offset = current_call_frame.stack.pop_usize()?;
        let return_size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = self.call_memory_expansion(
            current_call_frame,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )?;

        let (account_info, cold) = self.access_account(callee);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::call(
                &self.env.config,
                memory_expansion,
                cold,
                account_info.is_empty(),
                !value_to_transfer.is_zero(),
            )?,
        )?;

        // The new sender is the current contract.
        let msg_sender = current_call_frame.to;
        let is_static = current_call_frame.is_static;

        self.generic_call(
            current_call_frame,
            gas_for_call,
            value_to_transfer,
            msg_sender,
            callee,
            callee,
            is_static,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    pub fn op_callcode(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let gas_for_call = current_call_frame.stack.pop()?;
        let code_address = word_to_address(current_call_frame.stack.pop()?);
        let value_to_transfer = current_call_frame.stack.pop()?;
        let args_offset = current_call_frame.stack.pop_usize()?;
        let args_size = current_call_frame.stack.pop_usize()?;
        let return_offset = current_call_frame.stack.pop_usize()?;
        let return_size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = self.call_memory_expansion(
            current_call_frame,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )?;

        let (_, cold) = self.access_account(code_address);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::callcode(
                &self.env.config,
                memory_expansion,
                cold,
                !value_to_transfer.is_zero(),
            )?,
        )?;

        // Storage context stays in the current contract, only the code is
        // borrowed.
        let msg_sender = current_call_frame.to;
        let to = current_call_frame.to;
        let is_static = current_call_frame.is_static;

        self.generic_call(
            current_call_frame,
            gas_for_call,
            value_to_transfer,
            msg_sender,
            to,
            code_address,
            is_static,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    pub fn op_delegatecall(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let gas_for_call = current_call_frame.stack.pop()?;
        let code_address = word_to_address(current_call_frame.stack.pop()?);
        let args_offset = current_call_frame.stack.pop_usize()?;
        let args_size = current_call_frame.stack.pop_usize()?;
        let return_offset = current_call_frame.stack.pop_usize()?;
        let return_size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = self.call_memory_expansion(
            current_call_frame,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )?;

        let (_, cold) = self.access_account(code_address);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::delegatecall(&self.env.config, memory_expansion, cold)?,
        )?;

        // Sender, recipient and value are all inherited from the caller.
        let msg_sender = current_call_frame.msg_sender;
        let value = current_call_frame.msg_value;
        let to = current_call_frame.to;
        let is_static = current_call_frame.is_static;

        self.generic_call_no_transfer(
            current_call_frame,
            gas_for_call,
            value,
            msg_sender,
            to,
            code_address,
            is_static,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    pub fn op_staticcall(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let gas_for_call = current_call_frame.stack.pop()?;
        let code_address = word_to_address(current_call_frame.stack.pop()?);
        let args_offset = current_call_frame.stack.pop_usize()?;
        let args_size = current_call_frame.stack.pop_usize()?;
        let return_offset = current_call_frame.stack.pop_usize()?;
        let return_size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = self.call_memory_expansion(
            current_call_frame,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )?;

        let (_, cold) = self.access_account(code_address);
        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::staticcall(&self.env.config, memory_expansion, cold)?,
        )?;

        let msg_sender = current_call_frame.to;

        self.generic_call(
            current_call_frame,
            gas_for_call,
            U256::zero(),
            msg_sender,
            code_address,
            code_address,
            true,
            args_offset,
            args_size,
            return_offset,
            return_size,
        )
    }

    pub fn op_create(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let value = current_call_frame.stack.pop()?;
        let code_offset = current_call_frame.stack.pop_usize()?;
        let code_size = current_call_frame.stack.pop_usize()?;

        self.generic_create(current_call_frame, value, code_offset, code_size, None)
    }

    pub fn op_create2(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let value = current_call_frame.stack.pop()?;
        let code_offset = current_call_frame.stack.pop_usize()?;
        let code_size = current_call_frame.stack.pop_usize()?;
        let salt = current_call_frame.stack.pop()?;

        self.generic_create(current_call_frame, value, code_offset, code_size, Some(salt))
    }

    pub fn op_return(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(offset, size)?;
        self.increase_consumed_gas(current_call_frame, memory_expansion)?;

        current_call_frame.output = current_call_frame.memory.load_range(offset, size)?.into();
        Ok(OpcodeSuccess::Result(ResultReason::Return))
    }

    /// The state unwinding happens where the frame result is handled; this
    /// only collects the revert payload.
    pub fn op_revert(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(offset, size)?;
        self.increase_consumed_gas(current_call_frame, memory_expansion)?;

        current_call_frame.output = current_call_frame.memory.load_range(offset, size)?.into();
        Err(VMError::RevertOpcode)
    }

    pub fn op_invalid(&mut self, _current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        Err(VMError::InvalidOpcode)
    }

    pub fn op_selfdestruct(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let beneficiary = word_to_address(current_call_frame.stack.pop()?);
        let (beneficiary_info, cold) = self.access_account(beneficiary);

        let this = current_call_frame.to;
        let balance = self.state.get_account_info(this).balance;

        self.increase_consumed_gas(
            current_call_frame,
            gas_cost::selfdestruct(
                &self.env.config,
                cold,
                beneficiary_info.is_empty(),
                !balance.is_zero(),
            ),
        )?;

        // The balance always moves, even when the account survives.
        self.state.decrease_balance(this, balance)?;
        self.state.increase_balance(beneficiary, balance)?;

        // EIP-6780: only contracts created in this transaction are actually
        // destroyed; otherwise SELFDESTRUCT degrades to the transfer above.
        let eip6780 = self.env.config.is_activated(6780);
        let mark = !eip6780 || self.state.is_created(this);
        if mark {
            if self.state.selfdestructs().contains(&this) {
                // Repeated SELFDESTRUCT of the same account refunds only once.
            } else {
                let refund = gas_cost::selfdestruct_refund(&self.env.config);
                if refund > 0 {
                    self.state.add_refund(refund);
                }
            }
            self.state.mark_selfdestruct(this);
        }

        Ok(OpcodeSuccess::Result(ResultReason::SelfDestruct))
    }
}
