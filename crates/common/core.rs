pub mod chain_spec;
pub mod crypto;
pub mod params;
pub mod serde_utils;
pub mod trie;
pub mod types;

pub use bytes::Bytes;
pub use ethereum_types::{Address, Bloom, H160, H256, H32, H512, H64, U256};
