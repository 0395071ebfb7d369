use ethereum_types::U256;

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::opcode_handlers::arithmetic::twos_complement_abs;
use crate::vm::VM;

// Comparison & Bitwise Logic Operations (14)
// Opcodes: LT, GT, SLT, SGT, EQ, ISZERO, AND, OR, XOR, NOT, BYTE, SHL, SHR, SAR

impl VM {
    pub fn op_lt(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(bool_to_word(left < right))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_gt(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(bool_to_word(left > right))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_slt(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame
            .stack
            .push(bool_to_word(signed_less_than(left, right)))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sgt(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame
            .stack
            .push(bool_to_word(signed_less_than(right, left)))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_eq(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(bool_to_word(left == right))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_iszero(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::COMPARISON)?;
        let value = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(bool_to_word(value.is_zero()))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_and(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(left & right)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_or(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(left | right)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_xor(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let left = current_call_frame.stack.pop()?;
        let right = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(left ^ right)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_not(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let value = current_call_frame.stack.pop()?;
        current_call_frame.stack.push(!value)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_byte(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let index = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;
        let result = if index < U256::from(32) {
            value.byte(31 - index.low_u64() as usize)
        } else {
            0
        };
        current_call_frame.stack.push(U256::from(result))?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_shl(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let shift = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;
        let result = if shift < U256::from(256) {
            value << shift.low_u64() as usize
        } else {
            U256::zero()
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_shr(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let shift = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;
        let result = if shift < U256::from(256) {
            value >> shift.low_u64() as usize
        } else {
            U256::zero()
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sar(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::BITWISE)?;
        let shift = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;
        let negative = value.bit(255);

        let result = if shift >= U256::from(256) {
            if negative {
                U256::MAX
            } else {
                U256::zero()
            }
        } else if shift.is_zero() {
            value
        } else {
            let shifted = value >> shift.low_u64() as usize;
            if negative {
                // Fill the vacated high bits with ones.
                let fill = U256::MAX << (256 - shift.low_u64() as usize);
                shifted | fill
            } else {
                shifted
            }
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }
}

fn bool_to_word(condition: bool) -> U256 {
    if condition {
        U256::one()
    } else {
        U256::zero()
    }
}

fn signed_less_than(left: U256, right: U256) -> bool {
    let (_, left_negative) = twos_complement_abs(left);
    let (_, right_negative) = twos_complement_abs(right);
    match (left_negative, right_negative) {
        (true, false) => true,
        (false, true) => false,
        // Same sign: two's complement preserves order under unsigned compare.
        _ => left < right,
    }
}
