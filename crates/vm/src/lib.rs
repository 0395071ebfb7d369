pub mod account;
pub mod call_frame;
pub mod constants;
pub mod db;
pub mod environment;
pub mod eof;
pub mod errors;
pub mod gas_cost;
pub mod journal;
pub mod memory;
pub mod opcode_handlers;
pub mod opcodes;
pub mod precompiles;
pub mod transient;
pub mod vm;

pub use account::*;
pub use environment::*;
pub use errors::{ExecutionReport, TxResult};
pub use journal::JournaledState;
pub use vm::VM;
