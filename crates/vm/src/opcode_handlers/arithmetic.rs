use ethereum_types::{U256, U512};

use crate::call_frame::CallFrame;
use crate::errors::{OpcodeSuccess, VMError};
use crate::gas_cost;
use crate::vm::VM;

// Stop and Arithmetic Operations (11)
// Opcodes: ADD, MUL, SUB, DIV, SDIV, MOD, SMOD, ADDMOD, MULMOD, EXP, SIGNEXTEND

impl VM {
    pub fn op_add(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::ADD)?;
        let augend = current_call_frame.stack.pop()?;
        let addend = current_call_frame.stack.pop()?;
        current_call_frame
            .stack
            .push(augend.overflowing_add(addend).0)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mul(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::MUL)?;
        let multiplicand = current_call_frame.stack.pop()?;
        let multiplier = current_call_frame.stack.pop()?;
        current_call_frame
            .stack
            .push(multiplicand.overflowing_mul(multiplier).0)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sub(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SUB)?;
        let minuend = current_call_frame.stack.pop()?;
        let subtrahend = current_call_frame.stack.pop()?;
        current_call_frame
            .stack
            .push(minuend.overflowing_sub(subtrahend).0)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_div(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::DIV)?;
        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        let quotient = if divisor.is_zero() {
            U256::zero()
        } else {
            dividend / divisor
        };
        current_call_frame.stack.push(quotient)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_sdiv(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SDIV)?;
        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        if divisor.is_zero() {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        let (dividend_abs, dividend_negative) = twos_complement_abs(dividend);
        let (divisor_abs, divisor_negative) = twos_complement_abs(divisor);
        let quotient_abs = dividend_abs / divisor_abs;
        let quotient = if dividend_negative ^ divisor_negative {
            negate(quotient_abs)
        } else {
            quotient_abs
        };

        current_call_frame.stack.push(quotient)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mod(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::MOD)?;
        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        let remainder = if divisor.is_zero() {
            U256::zero()
        } else {
            dividend % divisor
        };
        current_call_frame.stack.push(remainder)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_smod(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SMOD)?;
        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        if divisor.is_zero() {
            current_call_frame.stack.push(U256::zero())?;
            return Ok(OpcodeSuccess::Continue);
        }

        // The result takes the sign of the dividend.
        let (dividend_abs, dividend_negative) = twos_complement_abs(dividend);
        let (divisor_abs, _) = twos_complement_abs(divisor);
        let remainder_abs = dividend_abs % divisor_abs;
        let remainder = if dividend_negative {
            negate(remainder_abs)
        } else {
            remainder_abs
        };

        current_call_frame.stack.push(remainder)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_addmod(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::ADDMOD)?;
        let augend: U512 = current_call_frame.stack.pop()?.into();
        let addend: U512 = current_call_frame.stack.pop()?.into();
        let modulus: U512 = current_call_frame.stack.pop()?.into();
        let result = if modulus.is_zero() {
            U256::zero()
        } else {
            u512_to_u256((augend + addend) % modulus)
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_mulmod(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::MULMOD)?;
        let multiplicand: U512 = current_call_frame.stack.pop()?.into();
        let multiplier: U512 = current_call_frame.stack.pop()?.into();
        let modulus: U512 = current_call_frame.stack.pop()?.into();
        let result = if modulus.is_zero() {
            U256::zero()
        } else {
            u512_to_u256((multiplicand * multiplier) % modulus)
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_exp(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        let base = current_call_frame.stack.pop()?;
        let exponent = current_call_frame.stack.pop()?;
        let gas = gas_cost::exp(exponent, &self.env.config)?;
        self.increase_consumed_gas(current_call_frame, gas)?;

        current_call_frame
            .stack
            .push(base.overflowing_pow(exponent).0)?;
        Ok(OpcodeSuccess::Continue)
    }

    pub fn op_signextend(&mut self, current_call_frame: &mut CallFrame) -> Result<OpcodeSuccess, VMError> {
        self.increase_consumed_gas(current_call_frame, gas_cost::SIGNEXTEND)?;
        let byte_index = current_call_frame.stack.pop()?;
        let value = current_call_frame.stack.pop()?;

        if byte_index >= U256::from(31) {
            current_call_frame.stack.push(value)?;
            return Ok(OpcodeSuccess::Continue);
        }

        let bit_index = 8 * byte_index.low_u64() as usize + 7;
        let mask = (U256::one() << bit_index) - 1;
        let result = if value.bit(bit_index) {
            value | !mask
        } else {
            value & mask
        };
        current_call_frame.stack.push(result)?;
        Ok(OpcodeSuccess::Continue)
    }
}

/// Magnitude and sign of a two's-complement word.
pub(crate) fn twos_complement_abs(value: U256) -> (U256, bool) {
    let negative = value.bit(255);
    if negative {
        (negate(value), true)
    } else {
        (value, false)
    }
}

pub(crate) fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn u512_to_u256(value: U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}
