use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, U256};
use serde::Deserialize;
use std::collections::HashMap;

use ethrun_rlp::encode::RLPEncode;

use super::{
    compute_receipts_root, compute_storage_root, compute_transactions_root,
    compute_withdrawals_root, code_hash, AccountState, Block, BlockBody, BlockHeader, ChainConfig,
    DEFAULT_OMMERS_HASH, INITIAL_BASE_FEE,
};
use crate::trie::secure_trie_root;

/// A geth-format genesis file: chain config plus the initial allocation.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    /// Chain configuration
    pub config: ChainConfig,
    /// The initial state of the accounts in the genesis block.
    pub alloc: HashMap<Address, GenesisAccount>,
    /// Genesis header values
    #[serde(default)]
    pub coinbase: Address,
    #[serde(default)]
    pub difficulty: U256,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub extra_data: Bytes,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub gas_limit: u64,
    #[serde(default, with = "crate::serde_utils::u64::hex_str")]
    pub nonce: u64,
    #[serde(default, alias = "mixHash", alias = "mixhash")]
    pub mix_hash: H256,
    #[serde(deserialize_with = "crate::serde_utils::u64::deser_hex_or_dec_str")]
    pub timestamp: u64,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub base_fee_per_gas: Option<u64>,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub blob_gas_used: Option<u64>,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub excess_blob_gas: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Default)]
pub struct GenesisAccount {
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub code: Bytes,
    #[serde(default)]
    pub storage: HashMap<H256, U256>,
    #[serde(deserialize_with = "crate::serde_utils::u256::deser_hex_or_dec_str")]
    pub balance: U256,
    #[serde(default, with = "crate::serde_utils::u64::hex_str")]
    pub nonce: u64,
}

impl From<&GenesisAccount> for AccountState {
    fn from(account: &GenesisAccount) -> Self {
        AccountState {
            nonce: account.nonce,
            balance: account.balance,
            storage_root: compute_storage_root(&account.storage),
            code_hash: code_hash(&account.code),
        }
    }
}

impl Genesis {
    pub fn get_block(&self) -> Block {
        Block {
            header: self.get_block_header(),
            body: self.get_block_body(),
        }
    }

    fn get_block_header(&self) -> BlockHeader {
        let mut blob_gas_used: Option<u64> = None;
        let mut excess_blob_gas: Option<u64> = None;
        if self.config.is_cancun_activated(self.timestamp) {
            blob_gas_used = Some(self.blob_gas_used.unwrap_or(0));
            excess_blob_gas = Some(self.excess_blob_gas.unwrap_or(0));
        }

        let base_fee_per_gas = if self.config.is_london_activated(0) {
            self.base_fee_per_gas.or(Some(INITIAL_BASE_FEE))
        } else {
            self.base_fee_per_gas
        };

        BlockHeader {
            parent_hash: H256::zero(),
            ommers_hash: *DEFAULT_OMMERS_HASH,
            coinbase: self.coinbase,
            state_root: self.compute_state_root(),
            transactions_root: compute_transactions_root(&[]),
            receipts_root: compute_receipts_root(&[]),
            logs_bloom: Bloom::zero(),
            difficulty: self.difficulty,
            number: 0,
            gas_limit: self.gas_limit,
            gas_used: 0,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            prev_randao: self.mix_hash,
            nonce: self.nonce,
            base_fee_per_gas,
            withdrawals_root: self
                .config
                .is_shanghai_activated(self.timestamp)
                .then_some(compute_withdrawals_root(&[])),
            blob_gas_used,
            excess_blob_gas,
            parent_beacon_block_root: self
                .config
                .is_cancun_activated(self.timestamp)
                .then_some(H256::zero()),
        }
    }

    fn get_block_body(&self) -> BlockBody {
        BlockBody {
            transactions: vec![],
            ommers: vec![],
            withdrawals: self
                .config
                .is_shanghai_activated(self.timestamp)
                .then_some(vec![]),
        }
    }

    pub fn compute_state_root(&self) -> H256 {
        let items = self.alloc.iter().map(|(address, account)| {
            (
                address.as_bytes().to_vec(),
                AccountState::from(account).encode_to_vec(),
            )
        });
        secure_trie_root(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const DEV_GENESIS: &str = r#"{
        "config": {
            "chainId": 3151908,
            "homesteadBlock": 0,
            "eip150Block": 0,
            "eip155Block": 0,
            "eip158Block": 0,
            "byzantiumBlock": 0,
            "constantinopleBlock": 0,
            "petersburgBlock": 0,
            "istanbulBlock": 0,
            "berlinBlock": 0,
            "londonBlock": 0,
            "mergeNetsplitBlock": 0,
            "shanghaiTime": 0,
            "cancunTime": 0,
            "terminalTotalDifficulty": 0,
            "terminalTotalDifficultyPassed": true
        },
        "alloc": {
            "0x6177843db3138ae69679A54b95cf345ED759450d": {
                "balance": "0x43c33c1937564800000"
            },
            "0x8943545177806ED17B9F23F0a21ee5948eCaa776": {
                "balance": "100000000000000000000",
                "nonce": "0x1"
            }
        },
        "coinbase": "0x0000000000000000000000000000000000000000",
        "difficulty": "0x0",
        "extraData": "0x",
        "gasLimit": "0x17d7840",
        "nonce": "0x1234",
        "mixhash": "0x0000000000000000000000000000000000000000000000000000000000000000",
        "timestamp": "1718040081"
    }"#;

    #[test]
    fn deserialize_genesis() {
        let genesis: Genesis = serde_json::from_str(DEV_GENESIS).unwrap();
        assert_eq!(genesis.config.chain_id, 3_151_908);
        assert_eq!(genesis.config.shanghai_time, Some(0));
        assert!(genesis.config.terminal_total_difficulty_passed);
        assert_eq!(genesis.gas_limit, 0x17d7840);
        assert_eq!(genesis.nonce, 0x1234);
        assert_eq!(genesis.timestamp, 1_718_040_081);

        let funded = Address::from_str("0x6177843db3138ae69679A54b95cf345ED759450d").unwrap();
        assert_eq!(
            genesis.alloc[&funded].balance,
            U256::from_str_radix("43c33c1937564800000", 16).unwrap()
        );
        let decimal = Address::from_str("0x8943545177806ED17B9F23F0a21ee5948eCaa776").unwrap();
        assert_eq!(
            genesis.alloc[&decimal].balance,
            U256::from_dec_str("100000000000000000000").unwrap()
        );
        assert_eq!(genesis.alloc[&decimal].nonce, 1);
    }

    #[test]
    fn genesis_block_shape() {
        let genesis: Genesis = serde_json::from_str(DEV_GENESIS).unwrap();
        let block = genesis.get_block();
        assert_eq!(block.header.number, 0);
        assert_eq!(block.header.parent_hash, H256::zero());
        assert_eq!(block.header.ommers_hash, *DEFAULT_OMMERS_HASH);
        assert_eq!(block.header.base_fee_per_gas, Some(INITIAL_BASE_FEE));
        // Cancun is active at genesis, so blob fields are zeroed in.
        assert_eq!(block.header.blob_gas_used, Some(0));
        assert_eq!(block.header.excess_blob_gas, Some(0));
        assert!(block.header.withdrawals_root.is_some());
        assert!(block.body.transactions.is_empty());
    }
}
