use bytes::Bytes;
use ethereum_types::H256;
use ethrun_core::types::Log;

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::opcodes::Opcode;
use crate::vm::VM;

// Logging Operations (5)
// Opcodes: LOG0 ... LOG4

impl VM {
    pub fn op_log(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let topic_count = current_call_frame.current_opcode() - Opcode::LOG0 as u8;
        let offset = current_call_frame.stack.pop_usize()?;
        let size = current_call_frame.stack.pop_usize()?;

        let mut topics = Vec::with_capacity(topic_count as usize);
        for _ in 0..topic_count {
            let topic = current_call_frame.stack.pop()?;
            let mut bytes = [0u8; 32];
            topic.to_big_endian(&mut bytes);
            topics.push(H256::from(bytes));
        }

        let memory_expansion = current_call_frame.memory.access_cost(offset, size)?;
        let gas = gas_cost::log(memory_expansion, topic_count as u64, size)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        let data = current_call_frame.memory.load_range(offset, size)?;
        self.state.add_log(Log {
            address: current_call_frame.to,
            topics,
            data: Bytes::from(data),
        });
        Ok(OpcodeSuccess::Continue)
    }
}
