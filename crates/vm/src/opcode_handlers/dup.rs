use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::opcodes::Opcode;
use crate::vm::VM;

// Duplication Operations (16)
// Opcodes: DUP1 ... DUP16

impl VM {
    pub fn op_dup(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::DUPN)?;
        let depth = (current_call_frame.current_opcode() - Opcode::DUP1 as u8) as usize;
        let value = current_call_frame.stack.peek(depth)?;
        current_call_frame.stack.push(value)?;
        Ok(OpcodeSuccess::Continue)
    }
}
