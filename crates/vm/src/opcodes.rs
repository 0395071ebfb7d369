use crate::call_frame::CallFrame;
use crate::environment::EvmConfig;
use crate::errors::{OpcodeSuccess, VMError};
use crate::vm::VM;
use ethrun_core::types::Fork;

/// Instruction set identifiers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Stop and Arithmetic Operations
    STOP = 0x00,
    ADD = 0x01,
    MUL = 0x02,
    SUB = 0x03,
    DIV = 0x04,
    SDIV = 0x05,
    MOD = 0x06,
    SMOD = 0x07,
    ADDMOD = 0x08,
    MULMOD = 0x09,
    EXP = 0x0A,
    SIGNEXTEND = 0x0B,

    // Comparison & Bitwise Logic Operations
    LT = 0x10,
    GT = 0x11,
    SLT = 0x12,
    SGT = 0x13,
    EQ = 0x14,
    ISZERO = 0x15,
    AND = 0x16,
    OR = 0x17,
    XOR = 0x18,
    NOT = 0x19,
    BYTE = 0x1A,
    SHL = 0x1B,
    SHR = 0x1C,
    SAR = 0x1D,

    KECCAK256 = 0x20,

    // Environmental Information
    ADDRESS = 0x30,
    BALANCE = 0x31,
    ORIGIN = 0x32,
    CALLER = 0x33,
    CALLVALUE = 0x34,
    CALLDATALOAD = 0x35,
    CALLDATASIZE = 0x36,
    CALLDATACOPY = 0x37,
    CODESIZE = 0x38,
    CODECOPY = 0x39,
    GASPRICE = 0x3A,
    EXTCODESIZE = 0x3B,
    EXTCODECOPY = 0x3C,
    RETURNDATASIZE = 0x3D,
    RETURNDATACOPY = 0x3E,
    EXTCODEHASH = 0x3F,

    // Block Information
    BLOCKHASH = 0x40,
    COINBASE = 0x41,
    TIMESTAMP = 0x42,
    NUMBER = 0x43,
    /// DIFFICULTY before the merge (EIP-4399 re-purposes the byte).
    PREVRANDAO = 0x44,
    GASLIMIT = 0x45,
    CHAINID = 0x46,
    SELFBALANCE = 0x47,
    BASEFEE = 0x48,
    BLOBHASH = 0x49,
    BLOBBASEFEE = 0x4A,

    // Stack, Memory, Storage, and Flow Operations
    POP = 0x50,
    MLOAD = 0x51,
    MSTORE = 0x52,
    MSTORE8 = 0x53,
    SLOAD = 0x54,
    SSTORE = 0x55,
    JUMP = 0x56,
    JUMPI = 0x57,
    PC = 0x58,
    MSIZE = 0x59,
    GAS = 0x5A,
    JUMPDEST = 0x5B,
    TLOAD = 0x5C,
    TSTORE = 0x5D,
    MCOPY = 0x5E,

    // Push Operations
    PUSH0 = 0x5F,
    PUSH1 = 0x60,
    PUSH2 = 0x61,
    PUSH3 = 0x62,
    PUSH4 = 0x63,
    PUSH5 = 0x64,
    PUSH6 = 0x65,
    PUSH7 = 0x66,
    PUSH8 = 0x67,
    PUSH9 = 0x68,
    PUSH10 = 0x69,
    PUSH11 = 0x6A,
    PUSH12 = 0x6B,
    PUSH13 = 0x6C,
    PUSH14 = 0x6D,
    PUSH15 = 0x6E,
    PUSH16 = 0x6F,
    PUSH17 = 0x70,
    PUSH18 = 0x71,
    PUSH19 = 0x72,
    PUSH20 = 0x73,
    PUSH21 = 0x74,
    PUSH22 = 0x75,
    PUSH23 = 0x76,
    PUSH24 = 0x77,
    PUSH25 = 0x78,
    PUSH26 = 0x79,
    PUSH27 = 0x7A,
    PUSH28 = 0x7B,
    PUSH29 = 0x7C,
    PUSH30 = 0x7D,
    PUSH31 = 0x7E,
    PUSH32 = 0x7F,

    // Duplication Operations
    DUP1 = 0x80,
    DUP2 = 0x81,
    DUP3 = 0x82,
    DUP4 = 0x83,
    DUP5 = 0x84,
    DUP6 = 0x85,
    DUP7 = 0x86,
    DUP8 = 0x87,
    DUP9 = 0x88,
    DUP10 = 0x89,
    DUP11 = 0x8A,
    DUP12 = 0x8B,
    DUP13 = 0x8C,
    DUP14 = 0x8D,
    DUP15 = 0x8E,
    DUP16 = 0x8F,

    // Exchange Operations
    SWAP1 = 0x90,
    SWAP2 = 0x91,
    SWAP3 = 0x92,
    SWAP4 = 0x93,
    SWAP5 = 0x94,
    SWAP6 = 0x95,
    SWAP7 = 0x96,
    SWAP8 = 0x97,
    SWAP9 = 0x98,
    SWAP10 = 0x99,
    SWAP11 = 0x9A,
    SWAP12 = 0x9B,
    SWAP13 = 0x9C,
    SWAP14 = 0x9D,
    SWAP15 = 0x9E,
    SWAP16 = 0x9F,

    // Logging Operations
    LOG0 = 0xA0,
    LOG1 = 0xA1,
    LOG2 = 0xA2,
    LOG3 = 0xA3,
    LOG4 = 0xA4,

    // System Operations
    CREATE = 0xF0,
    CALL = 0xF1,
    CALLCODE = 0xF2,
    RETURN = 0xF3,
    DELEGATECALL = 0xF4,
    CREATE2 = 0xF5,
    STATICCALL = 0xFA,
    REVERT = 0xFD,
    INVALID = 0xFE,
    SELFDESTRUCT = 0xFF,
}

pub type OpcodeHandler = fn(&mut VM, &mut CallFrame) -> Result<OpcodeSuccess, VMError>;

/// Dispatch table of the instruction set active under a given config.
///
/// The table is a pure function of (fork, active EIPs) plus any custom
/// overrides; it must be rebuilt when the chain spec signals a fork change.
#[derive(Clone, Copy)]
pub struct OpcodeTable {
    entries: [Option<OpcodeHandler>; 256],
}

impl OpcodeTable {
    pub fn new(config: &EvmConfig) -> Self {
        let mut table = Self {
            entries: [None; 256],
        };

        // Frontier base set.
        table.set(Opcode::STOP, VM::op_stop);
        table.set(Opcode::ADD, VM::op_add);
        table.set(Opcode::MUL, VM::op_mul);
        table.set(Opcode::SUB, VM::op_sub);
        table.set(Opcode::DIV, VM::op_div);
        table.set(Opcode::SDIV, VM::op_sdiv);
        table.set(Opcode::MOD, VM::op_mod);
        table.set(Opcode::SMOD, VM::op_smod);
        table.set(Opcode::ADDMOD, VM::op_addmod);
        table.set(Opcode::MULMOD, VM::op_mulmod);
        table.set(Opcode::EXP, VM::op_exp);
        table.set(Opcode::SIGNEXTEND, VM::op_signextend);

        table.set(Opcode::LT, VM::op_lt);
        table.set(Opcode::GT, VM::op_gt);
        table.set(Opcode::SLT, VM::op_slt);
        table.set(Opcode::SGT, VM::op_sgt);
        table.set(Opcode::EQ, VM::op_eq);
        table.set(Opcode::ISZERO, VM::op_iszero);
        table.set(Opcode::AND, VM::op_and);
        table.set(Opcode::OR, VM::op_or);
        table.set(Opcode::XOR, VM::op_xor);
        table.set(Opcode::NOT, VM::op_not);
        table.set(Opcode::BYTE, VM::op_byte);

        table.set(Opcode::KECCAK256, VM::op_keccak256);

        table.set(Opcode::ADDRESS, VM::op_address);
        table.set(Opcode::BALANCE, VM::op_balance);
        table.set(Opcode::ORIGIN, VM::op_origin);
        table.set(Opcode::CALLER, VM::op_caller);
        table.set(Opcode::CALLVALUE, VM::op_callvalue);
        table.set(Opcode::CALLDATALOAD, VM::op_calldataload);
        table.set(Opcode::CALLDATASIZE, VM::op_calldatasize);
        table.set(Opcode::CALLDATACOPY, VM::op_calldatacopy);
        table.set(Opcode::CODESIZE, VM::op_codesize);
        table.set(Opcode::CODECOPY, VM::op_codecopy);
        table.set(Opcode::GASPRICE, VM::op_gasprice);
        table.set(Opcode::EXTCODESIZE, VM::op_extcodesize);
        table.set(Opcode::EXTCODECOPY, VM::op_extcodecopy);

        table.set(Opcode::BLOCKHASH, VM::op_blockhash);
        table.set(Opcode::COINBASE, VM::op_coinbase);
        table.set(Opcode::TIMESTAMP, VM::op_timestamp);
        table.set(Opcode::NUMBER, VM::op_number);
        table.set(Opcode::PREVRANDAO, VM::op_prevrandao);
        table.set(Opcode::GASLIMIT, VM::op_gaslimit);

        table.set(Opcode::POP, VM::op_pop);
        table.set(Opcode::MLOAD, VM::op_mload);
        table.set(Opcode::MSTORE, VM::op_mstore);
        table.set(Opcode::MSTORE8, VM::op_mstore8);
        table.set(Opcode::SLOAD, VM::op_sload);
        table.set(Opcode::SSTORE, VM::op_sstore);
        table.set(Opcode::JUMP, VM::op_jump);
        table.set(Opcode::JUMPI, VM::op_jumpi);
        table.set(Opcode::PC, VM::op_pc);
        table.set(Opcode::MSIZE, VM::op_msize);
        table.set(Opcode::GAS, VM::op_gas);
        table.set(Opcode::JUMPDEST, VM::op_jumpdest);

        for byte in Opcode::PUSH1 as u8..=Opcode::PUSH32 as u8 {
            table.set_byte(byte, VM::op_push);
        }
        for byte in Opcode::DUP1 as u8..=Opcode::DUP16 as u8 {
            table.set_byte(byte, VM::op_dup);
        }
        for byte in Opcode::SWAP1 as u8..=Opcode::SWAP16 as u8 {
            table.set_byte(byte, VM::op_swap);
        }
        for byte in Opcode::LOG0 as u8..=Opcode::LOG4 as u8 {
            table.set_byte(byte, VM::op_log);
        }

        table.set(Opcode::CREATE, VM::op_create);
        table.set(Opcode::CALL, VM::op_call);
        table.set(Opcode::CALLCODE, VM::op_callcode);
        table.set(Opcode::RETURN, VM::op_return);
        table.set(Opcode::INVALID, VM::op_invalid);
        table.set(Opcode::SELFDESTRUCT, VM::op_selfdestruct);

        // Fork-gated additions.
        if config.gte(Fork::Homestead) {
            table.set(Opcode::DELEGATECALL, VM::op_delegatecall);
        }
        if config.gte(Fork::Byzantium) {
            table.set(Opcode::RETURNDATASIZE, VM::op_returndatasize);
            table.set(Opcode::RETURNDATACOPY, VM::op_returndatacopy);
            table.set(Opcode::STATICCALL, VM::op_staticcall);
            table.set(Opcode::REVERT, VM::op_revert);
        }
        if config.gte(Fork::Constantinople) {
            table.set(Opcode::SHL, VM::op_shl);
            table.set(Opcode::SHR, VM::op_shr);
            table.set(Opcode::SAR, VM::op_sar);
            table.set(Opcode::CREATE2, VM::op_create2);
            table.set(Opcode::EXTCODEHASH, VM::op_extcodehash);
        }
        if config.gte(Fork::Istanbul) {
            table.set(Opcode::CHAINID, VM::op_chainid);
            table.set(Opcode::SELFBALANCE, VM::op_selfbalance);
        }
        if config.is_activated(3198) {
            table.set(Opcode::BASEFEE, VM::op_basefee);
        }
        if config.is_activated(3855) {
            table.set(Opcode::PUSH0, VM::op_push0);
        }
        if config.is_activated(1153) {
            table.set(Opcode::TLOAD, VM::op_tload);
            table.set(Opcode::TSTORE, VM::op_tstore);
        }
        if config.is_activated(5656) {
            table.set(Opcode::MCOPY, VM::op_mcopy);
        }
        if config.is_activated(4844) {
            table.set(Opcode::BLOBHASH, VM::op_blobhash);
        }
        if config.is_activated(7516) {
            table.set(Opcode::BLOBBASEFEE, VM::op_blobbasefee);
        }

        table
    }

    fn set(&mut self, opcode: Opcode, handler: OpcodeHandler) {
        self.entries[opcode as u8 as usize] = Some(handler);
    }

    fn set_byte(&mut self, byte: u8, handler: OpcodeHandler) {
        self.entries[byte as usize] = Some(handler);
    }

    pub fn get(&self, byte: u8) -> Option<OpcodeHandler> {
        self.entries[byte as usize]
    }

    pub fn is_defined(&self, byte: u8) -> bool {
        self.entries[byte as usize].is_some()
    }

    /// Installs a custom handler, replacing any existing entry.
    pub fn with_custom(mut self, opcode: u8, handler: OpcodeHandler) -> Self {
        self.set_byte(opcode, handler);
        self
    }

    /// Removes an entry; executing the byte then fails with InvalidOpcode.
    pub fn without(mut self, opcode: u8) -> Self {
        self.entries[opcode as usize] = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_gating() {
        let frontier = OpcodeTable::new(&EvmConfig::new_for_fork(Fork::Frontier));
        assert!(frontier.is_defined(Opcode::ADD as u8));
        assert!(!frontier.is_defined(Opcode::DELEGATECALL as u8));
        assert!(!frontier.is_defined(Opcode::SHL as u8));
        assert!(!frontier.is_defined(Opcode::PUSH0 as u8));

        let byzantium = OpcodeTable::new(&EvmConfig::new_for_fork(Fork::Byzantium));
        assert!(byzantium.is_defined(Opcode::REVERT as u8));
        assert!(byzantium.is_defined(Opcode::STATICCALL as u8));
        assert!(!byzantium.is_defined(Opcode::CREATE2 as u8));

        let shanghai = OpcodeTable::new(&EvmConfig::new_for_fork(Fork::Shanghai));
        assert!(shanghai.is_defined(Opcode::PUSH0 as u8));
        assert!(!shanghai.is_defined(Opcode::TLOAD as u8));
        assert!(!shanghai.is_defined(Opcode::MCOPY as u8));

        let cancun = OpcodeTable::new(&EvmConfig::new_for_fork(Fork::Cancun));
        assert!(cancun.is_defined(Opcode::TLOAD as u8));
        assert!(cancun.is_defined(Opcode::MCOPY as u8));
        assert!(cancun.is_defined(Opcode::BLOBHASH as u8));
        assert!(cancun.is_defined(Opcode::BLOBBASEFEE as u8));
    }

    #[test]
    fn custom_overrides() {
        let table = OpcodeTable::new(&EvmConfig::default()).without(Opcode::SELFDESTRUCT as u8);
        assert!(!table.is_defined(Opcode::SELFDESTRUCT as u8));

        let with_custom = table.with_custom(0x0C, VM::op_stop);
        assert!(with_custom.is_defined(0x0C));
    }

    #[test]
    fn undefined_gaps_stay_undefined() {
        let table = OpcodeTable::new(&EvmConfig::default());
        assert!(!table.is_defined(0x0C));
        assert!(!table.is_defined(0x21));
        assert!(!table.is_defined(0xF6));
    }
}
