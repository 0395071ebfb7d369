use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::opcodes::Opcode;
use crate::vm::VM;

// Exchange Operations (16)
// Opcodes: SWAP1 ... SWAP16

impl VM {
    pub fn op_swap(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SWAPN)?;
        let depth = (current_call_frame.current_opcode() - Opcode::SWAP1 as u8) as usize + 1;
        current_call_frame.stack.swap(depth)?;
        Ok(OpcodeSuccess::Continue)
    }
}
