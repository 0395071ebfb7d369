use ethereum_types::U256;

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::opcodes::Opcode;
use crate::vm::VM;

// Push Operations (33)
// Opcodes: PUSH0, PUSH1 ... PUSH32

impl VM {
    /// PUSH1..PUSH32. The width comes from the opcode byte under the pc.
    pub fn op_push(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::PUSHN)?;

        let n_bytes = (current_call_frame.current_opcode() - Opcode::PUSH1 as u8) as usize + 1;
        let payload_start = current_call_frame.pc + 1;

        // Bytes past the end of the code read as zeros.
        let mut padded = [0u8; 32];
        let code = &current_call_frame.bytecode;
        let available = code.len().saturating_sub(payload_start).min(n_bytes);
        padded[32 - n_bytes..32 - n_bytes + available]
            .copy_from_slice(&code[payload_start..payload_start + available]);

        current_call_frame
            .stack
            .push(U256::from_big_endian(&padded))?;
        current_call_frame.increment_pc_by(n_bytes)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_push0(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::PUSH0)?;
        current_call_frame.stack.push(U256::zero())?;
        Ok(OpcodeSuccess::Continue)
    }
}
