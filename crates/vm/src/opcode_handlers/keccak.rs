use ethereum_types::U256;
use sha3::{Digest, Keccak256};

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::vm::VM;

// KECCAK256 (1)

impl VM {
    pub fn op_keccak256(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let memory_expansion = current_call_frame.memory.access_cost(offset, size)?;
        let gas = gas_cost::keccak256(memory_expansion, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        let data = current_call_frame.memory.load_range(offset, size)?;
        let digest: [u8; 32] = Keccak256::digest(&data).into();
        current_call_frame
            .stack
            .push(U256::from_big_endian(&digest))?;
        Ok(OpcodeSuccess::Continue)
    }
}
