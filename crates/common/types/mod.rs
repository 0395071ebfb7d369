mod account;
mod blobs_bundle;
mod block;
mod chain_config;
mod constants;
mod fork_id;
mod genesis;
mod receipt;
pub mod transaction;

pub use account::*;
pub use blobs_bundle::*;
pub use block::*;
pub use chain_config::*;
pub use constants::*;
pub use fork_id::*;
pub use genesis::*;
pub use receipt::*;
pub use transaction::*;
