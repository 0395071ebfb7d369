//! Gas costs of the EVM instructions, including the fork-dependent
//! repricings (EIP-150, EIP-2200, EIP-2929, EIP-3529, EIP-3860).

use ethereum_types::U256;
use ethrun_core::types::Fork;

use crate::constants::WORD_SIZE;
use crate::environment::EvmConfig;
use crate::errors::OutOfGasError;

pub const ADD: u64 = 3;
pub const MUL: u64 = 5;
pub const SUB: u64 = 3;
pub const DIV: u64 = 5;
pub const SDIV: u64 = 5;
pub const MOD: u64 = 5;
pub const SMOD: u64 = 5;
pub const ADDMOD: u64 = 8;
pub const MULMOD: u64 = 8;
pub const EXP_STATIC: u64 = 10;
pub const SIGNEXTEND: u64 = 5;
pub const COMPARISON: u64 = 3; // LT, GT, SLT, SGT, EQ, ISZERO
pub const BITWISE: u64 = 3; // AND, OR, XOR, NOT, BYTE, SHL, SHR, SAR

pub const KECCAK256_STATIC: u64 = 30;
pub const KECCAK256_WORD: u64 = 6;

pub const QUICK_STEP: u64 = 2; // ADDRESS, ORIGIN, CALLER, &c.
pub const CALLDATALOAD: u64 = 3;
pub const COPY_STATIC: u64 = 3;
pub const COPY_WORD: u64 = 3;
pub const BLOCKHASH: u64 = 20;
pub const SELFBALANCE: u64 = 5;
pub const BLOBHASH: u64 = 3;

pub const POP: u64 = 2;
pub const MLOAD_STATIC: u64 = 3;
pub const MSTORE_STATIC: u64 = 3;
pub const JUMP: u64 = 8;
pub const JUMPI: u64 = 10;
pub const JUMPDEST: u64 = 1;
pub const PUSH0: u64 = 2;
pub const PUSHN: u64 = 3;
pub const DUPN: u64 = 3;
pub const SWAPN: u64 = 3;
pub const TLOAD: u64 = 100;
pub const TSTORE: u64 = 100;

pub const LOG_STATIC: u64 = 375;
pub const LOG_TOPIC: u64 = 375;
pub const LOG_DATA_BYTE: u64 = 8;

pub const WARM_ADDRESS_ACCESS_COST: u64 = 100;
pub const COLD_ADDRESS_ACCESS_COST: u64 = 2600;
pub const WARM_STORAGE_READ_COST: u64 = 100;
pub const COLD_SLOAD_COST: u64 = 2100;

// Access-list intrinsic costs (EIP-2930).
pub const ACCESS_LIST_ADDRESS_COST: u64 = 2400;
pub const ACCESS_LIST_STORAGE_KEY_COST: u64 = 1900;

pub const SSTORE_SET: u64 = 20_000;
pub const SSTORE_RESET: u64 = 5000;
pub const SSTORE_CLEAR_REFUND_LEGACY: u64 = 15_000;
pub const SSTORE_CLEAR_REFUND_EIP3529: u64 = 4800;
pub const SSTORE_SENTRY: u64 = 2300;

pub const CALL_VALUE_TRANSFER: u64 = 9000;
pub const CALL_NEW_ACCOUNT: u64 = 25_000;
pub const CALL_STIPEND: u64 = 2300;

pub const SELFDESTRUCT_STATIC: u64 = 5000;
pub const SELFDESTRUCT_NEW_ACCOUNT: u64 = 25_000;
pub const SELFDESTRUCT_REFUND_LEGACY: u64 = 24_000;

fn word_count(size: usize) -> Result<u64, OutOfGasError> {
    Ok(((size as u64)
        .checked_add(WORD_SIZE as u64 - 1)
        .ok_or(OutOfGasError::ArithmeticOperationOverflow)?)
        / WORD_SIZE as u64)
}

fn add3(a: u64, b: u64, c: u64) -> Result<u64, OutOfGasError> {
    a.checked_add(b)
        .and_then(|sum| sum.checked_add(c))
        .ok_or(OutOfGasError::GasCostOverflow)
}

/// EXP: static plus a per-exponent-byte charge (raised by EIP-160).
pub fn exp(exponent: U256, config: &EvmConfig) -> Result<u64, OutOfGasError> {
    let byte_size = (exponent.bits() as u64 + 7) / 8;
    let per_byte: u64 = if config.gte(Fork::SpuriousDragon) {
        50
    } else {
        10
    };
    EXP_STATIC
        .checked_add(
            per_byte
                .checked_mul(byte_size)
                .ok_or(OutOfGasError::GasCostOverflow)?,
        )
        .ok_or(OutOfGasError::GasCostOverflow)
}

pub fn keccak256(memory_expansion: u64, size: usize) -> Result<u64, OutOfGasError> {
    let word_cost = KECCAK256_WORD
        .checked_mul(word_count(size)?)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    add3(KECCAK256_STATIC, word_cost, memory_expansion)
}

/// CALLDATACOPY / CODECOPY / RETURNDATACOPY / MCOPY share the 3 + 3·words
/// shape.
pub fn copy(memory_expansion: u64, size: usize) -> Result<u64, OutOfGasError> {
    let word_cost = COPY_WORD
        .checked_mul(word_count(size)?)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    add3(COPY_STATIC, word_cost, memory_expansion)
}

pub fn log(memory_expansion: u64, topic_count: u64, size: usize) -> Result<u64, OutOfGasError> {
    let topic_cost = LOG_TOPIC
        .checked_mul(topic_count)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    let data_cost = LOG_DATA_BYTE
        .checked_mul(size as u64)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    add3(LOG_STATIC, topic_cost, data_cost)?
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow)
}

/// SLOAD: warm/cold under EIP-2929, flat per-fork price before.
pub fn sload(config: &EvmConfig, cold: bool) -> u64 {
    if config.is_activated(2929) {
        if cold {
            COLD_SLOAD_COST
        } else {
            WARM_STORAGE_READ_COST
        }
    } else if config.gte(Fork::Istanbul) {
        800
    } else if config.gte(Fork::Tangerine) {
        200
    } else {
        50
    }
}

/// BALANCE: warm/cold under EIP-2929, flat per-fork price before.
pub fn balance(config: &EvmConfig, cold: bool) -> u64 {
    if config.is_activated(2929) {
        address_access_cost(cold)
    } else if config.gte(Fork::Istanbul) {
        700
    } else if config.gte(Fork::Tangerine) {
        400
    } else {
        20
    }
}

/// EXTCODESIZE / EXTCODEHASH account-access part.
pub fn ext_code_access(config: &EvmConfig, cold: bool) -> u64 {
    if config.is_activated(2929) {
        address_access_cost(cold)
    } else if config.gte(Fork::Tangerine) {
        700
    } else {
        20
    }
}

pub fn ext_code_copy(
    config: &EvmConfig,
    cold: bool,
    memory_expansion: u64,
    size: usize,
) -> Result<u64, OutOfGasError> {
    let word_cost = COPY_WORD
        .checked_mul(word_count(size)?)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    add3(ext_code_access(config, cold), word_cost, memory_expansion)
}

pub fn address_access_cost(cold: bool) -> u64 {
    if cold {
        COLD_ADDRESS_ACCESS_COST
    } else {
        WARM_ADDRESS_ACCESS_COST
    }
}

/// The base account-access charge of the CALL family.
fn call_base(config: &EvmConfig, cold: bool) -> u64 {
    if config.is_activated(2929) {
        address_access_cost(cold)
    } else if config.gte(Fork::Tangerine) {
        700
    } else {
        40
    }
}

pub fn call(
    config: &EvmConfig,
    memory_expansion: u64,
    cold: bool,
    callee_empty: bool,
    transfers_value: bool,
) -> Result<u64, OutOfGasError> {
    let mut cost = call_base(config, cold)
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    if transfers_value {
        cost = cost
            .checked_add(CALL_VALUE_TRANSFER)
            .ok_or(OutOfGasError::GasCostOverflow)?;
        // New-account surcharge only applies to value-bearing calls into
        // empty accounts (EIP-161 semantics).
        if callee_empty {
            cost = cost
                .checked_add(CALL_NEW_ACCOUNT)
                .ok_or(OutOfGasError::GasCostOverflow)?;
        }
    }
    Ok(cost)
}

pub fn callcode(
    config: &EvmConfig,
    memory_expansion: u64,
    cold: bool,
    transfers_value: bool,
) -> Result<u64, OutOfGasError> {
    let mut cost = call_base(config, cold)
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    if transfers_value {
        cost = cost
            .checked_add(CALL_VALUE_TRANSFER)
            .ok_or(OutOfGasError::GasCostOverflow)?;
    }
    Ok(cost)
}

pub fn delegatecall(
    config: &EvmConfig,
    memory_expansion: u64,
    cold: bool,
) -> Result<u64, OutOfGasError> {
    call_base(config, cold)
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow)
}

pub use self::delegatecall as staticcall;

/// EIP-150: at most 63/64 of the remaining gas may be forwarded.
pub fn max_message_call_gas(remaining: u64) -> u64 {
    remaining - remaining / 64
}

pub fn create(
    config: &EvmConfig,
    memory_expansion: u64,
    init_code_size: usize,
    hashes_initcode: bool,
) -> Result<u64, OutOfGasError> {
    let mut cost = crate::constants::CREATE_BASE_COST
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    // CREATE2 pays to hash the initcode.
    if hashes_initcode {
        cost = cost
            .checked_add(
                KECCAK256_WORD
                    .checked_mul(word_count(init_code_size)?)
                    .ok_or(OutOfGasError::GasCostOverflow)?,
            )
            .ok_or(OutOfGasError::GasCostOverflow)?;
    }
    // EIP-3860 initcode metering.
    if config.is_activated(3860) {
        cost = cost
            .checked_add(
                crate::constants::INIT_CODE_WORD_COST
                    .checked_mul(word_count(init_code_size)?)
                    .ok_or(OutOfGasError::GasCostOverflow)?,
            )
            .ok_or(OutOfGasError::GasCostOverflow)?;
    }
    Ok(cost)
}

pub fn selfdestruct(config: &EvmConfig, cold: bool, beneficiary_empty: bool, has_balance: bool) -> u64 {
    let mut cost = if config.gte(Fork::Tangerine) {
        SELFDESTRUCT_STATIC
    } else {
        0
    };
    if config.is_activated(2929) && cold {
        cost += COLD_ADDRESS_ACCESS_COST;
    }
    if beneficiary_empty && has_balance && config.gte(Fork::SpuriousDragon) {
        cost += SELFDESTRUCT_NEW_ACCOUNT;
    }
    cost
}

/// Refund granted by SELFDESTRUCT; removed by EIP-3529.
pub fn selfdestruct_refund(config: &EvmConfig) -> u64 {
    if config.is_activated(3529) {
        0
    } else {
        SELFDESTRUCT_REFUND_LEGACY
    }
}

/// SSTORE pricing outcome: the gas charge plus refund-counter adjustments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SstoreGas {
    pub cost: u64,
    pub refund_add: u64,
    pub refund_sub: u64,
}

/// SSTORE under net gas metering (EIP-2200/2929/3529), falling back to the
/// original set/reset scheme before Istanbul.
pub fn sstore(
    config: &EvmConfig,
    original: U256,
    current: U256,
    new: U256,
    slot_cold: bool,
) -> SstoreGas {
    let berlin = config.is_activated(2929);
    let clear_refund = if config.is_activated(3529) {
        SSTORE_CLEAR_REFUND_EIP3529
    } else {
        SSTORE_CLEAR_REFUND_LEGACY
    };

    if !config.gte(Fork::Istanbul) {
        // Legacy scheme: price on the current/new pair only.
        let cost = if current.is_zero() && !new.is_zero() {
            SSTORE_SET
        } else {
            SSTORE_RESET
        };
        let refund_add = if !current.is_zero() && new.is_zero() {
            SSTORE_CLEAR_REFUND_LEGACY
        } else {
            0
        };
        return SstoreGas {
            cost,
            refund_add,
            refund_sub: 0,
        };
    }

    let warm_read = if berlin { WARM_STORAGE_READ_COST } else { 800 };
    let reset_cost = if berlin {
        SSTORE_RESET - COLD_SLOAD_COST
    } else {
        SSTORE_RESET
    };

    let mut gas = SstoreGas::default();

    gas.cost = if new == current {
        warm_read
    } else if current == original {
        if original.is_zero() {
            SSTORE_SET
        } else {
            reset_cost
        }
    } else {
        warm_read
    };
    if berlin && slot_cold {
        gas.cost += COLD_SLOAD_COST;
    }

    if new != current {
        if current == original {
            if !original.is_zero() && new.is_zero() {
                gas.refund_add += clear_refund;
            }
        } else {
            // Dirty slot bookkeeping.
            if !original.is_zero() {
                if current.is_zero() {
                    gas.refund_sub += clear_refund;
                }
                if new.is_zero() {
                    gas.refund_add += clear_refund;
                }
            }
            if new == original {
                if original.is_zero() {
                    gas.refund_add += SSTORE_SET - warm_read;
                } else {
                    gas.refund_add += reset_cost - warm_read;
                }
            }
        }
    }

    gas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancun() -> EvmConfig {
        EvmConfig::new_for_fork(Fork::Cancun)
    }

    #[test]
    fn sstore_fresh_set_and_clear() {
        let config = cancun();
        // 0 -> 0 -> 7: full set price plus the cold surcharge.
        let set = sstore(&config, U256::zero(), U256::zero(), 7.into(), true);
        assert_eq!(set.cost, SSTORE_SET + COLD_SLOAD_COST);
        assert_eq!(set.refund_add, 0);

        // 7 -> 7 -> 0 on a warm slot: reset price plus the clear refund.
        let clear = sstore(&config, 7.into(), 7.into(), U256::zero(), false);
        assert_eq!(clear.cost, SSTORE_RESET - COLD_SLOAD_COST);
        assert_eq!(clear.refund_add, SSTORE_CLEAR_REFUND_EIP3529);
    }

    #[test]
    fn sstore_noop_is_warm_read() {
        let config = cancun();
        let noop = sstore(&config, 7.into(), 7.into(), 7.into(), false);
        assert_eq!(noop.cost, WARM_STORAGE_READ_COST);
        assert_eq!(noop, SstoreGas { cost: 100, refund_add: 0, refund_sub: 0 });
    }

    #[test]
    fn sstore_dirty_restore_refunds_difference() {
        let config = cancun();
        // original 5, currently 9, writing 5 back.
        let restored = sstore(&config, 5.into(), 9.into(), 5.into(), false);
        assert_eq!(restored.cost, WARM_STORAGE_READ_COST);
        assert_eq!(
            restored.refund_add,
            SSTORE_RESET - COLD_SLOAD_COST - WARM_STORAGE_READ_COST
        );
    }

    #[test]
    fn sstore_unclear_removes_refund() {
        let config = cancun();
        // original 5, cleared earlier in the tx, now writing 6.
        let unclear = sstore(&config, 5.into(), U256::zero(), 6.into(), false);
        assert_eq!(unclear.refund_sub, SSTORE_CLEAR_REFUND_EIP3529);
    }

    #[test]
    fn pre_istanbul_scheme() {
        let config = EvmConfig::new_for_fork(Fork::Byzantium);
        let set = sstore(&config, U256::zero(), U256::zero(), 7.into(), true);
        assert_eq!(set.cost, SSTORE_SET);
        let clear = sstore(&config, 7.into(), 7.into(), U256::zero(), true);
        assert_eq!(clear.cost, SSTORE_RESET);
        assert_eq!(clear.refund_add, SSTORE_CLEAR_REFUND_LEGACY);
    }

    #[test]
    fn exp_byte_price_rises_at_spurious_dragon() {
        let pre = EvmConfig::new_for_fork(Fork::Homestead);
        let post = EvmConfig::new_for_fork(Fork::SpuriousDragon);
        let exponent = U256::from(0x1_0000u64); // 3 bytes
        assert_eq!(exp(exponent, &pre).unwrap(), 10 + 10 * 3);
        assert_eq!(exp(exponent, &post).unwrap(), 10 + 50 * 3);
    }

    #[test]
    fn one_64th_is_withheld() {
        assert_eq!(max_message_call_gas(6400), 6300);
        assert_eq!(max_message_call_gas(64), 63);
        assert_eq!(max_message_call_gas(10), 10);
    }

    #[test]
    fn cold_and_warm_account_access() {
        let config = cancun();
        assert_eq!(balance(&config, true), COLD_ADDRESS_ACCESS_COST);
        assert_eq!(balance(&config, false), WARM_ADDRESS_ACCESS_COST);
        let legacy = EvmConfig::new_for_fork(Fork::Istanbul);
        assert_eq!(balance(&legacy, true), 700);
        assert_eq!(balance(&legacy, false), 700);
    }
}
