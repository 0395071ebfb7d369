use crc32fast::Hasher;
use ethereum_types::H32;

use ethrun_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use super::{BlockHash, BlockNumber, ChainConfig};

/// EIP-2124 fork identifier: a checksum of the fork schedule as seen from a
/// given head, plus the next scheduled activation.
#[derive(Debug, PartialEq, Eq)]
pub struct ForkId {
    pub fork_hash: H32,
    pub fork_next: u64,
}

impl ForkId {
    pub fn new(
        chain_config: &ChainConfig,
        genesis_hash: BlockHash,
        head_timestamp: u64,
        head_block_number: BlockNumber,
    ) -> Self {
        let (block_number_based_forks, timestamp_based_forks) = chain_config.gather_forks();
        let mut hasher = Hasher::new();
        hasher.update(genesis_hash.as_bytes());

        let mut fork_next = update_checksum(block_number_based_forks, &mut hasher, head_block_number);
        if fork_next == 0 {
            fork_next = update_checksum(timestamp_based_forks, &mut hasher, head_timestamp);
        }

        let fork_hash = H32::from_slice(&hasher.finalize().to_be_bytes());
        Self {
            fork_hash,
            fork_next,
        }
    }
}

/// Feeds every activation at or before `head` into the checksum, skipping
/// duplicates, and returns the first future activation (0 when none).
fn update_checksum(forks: Vec<Option<u64>>, hasher: &mut Hasher, head: u64) -> u64 {
    let mut last_included = 0;

    for activation in forks.into_iter().flatten() {
        if activation > head {
            return activation;
        }
        if activation != last_included && activation != 0 {
            hasher.update(&activation.to_be_bytes());
            last_included = activation;
        }
    }
    0
}

impl RLPEncode for ForkId {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.fork_hash)
            .encode_field(&self.fork_next)
            .finish();
    }
}

impl RLPDecode for ForkId {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (fork_hash, decoder) = decoder.decode_field("forkHash")?;
        let (fork_next, decoder) = decoder.decode_field("forkNext")?;
        let remaining = decoder.finish()?;
        let fork_id = ForkId {
            fork_hash,
            fork_next,
        };
        Ok((fork_id, remaining))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethereum_types::H256;
    use hex_literal::hex;

    use super::*;

    fn mainnet_config() -> ChainConfig {
        ChainConfig {
            chain_id: 1,
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            eip150_block: Some(2_463_000),
            eip155_block: Some(2_675_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            petersburg_block: Some(7_280_000),
            istanbul_block: Some(9_069_000),
            muir_glacier_block: Some(9_200_000),
            ..Default::default()
        }
    }

    fn mainnet_genesis() -> H256 {
        H256::from_str("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3").unwrap()
    }

    #[test]
    fn mainnet_fork_id_vectors() {
        // From the EIP-2124 reference vectors.
        let config = mainnet_config();
        let genesis = mainnet_genesis();

        let unsynced = ForkId::new(&config, genesis, 0, 0);
        assert_eq!(unsynced.fork_hash, H32::from_str("fc64ec04").unwrap());
        assert_eq!(unsynced.fork_next, 1_150_000);

        let homestead = ForkId::new(&config, genesis, 0, 1_150_000);
        assert_eq!(homestead.fork_hash, H32::from_str("97c2c34c").unwrap());
        assert_eq!(homestead.fork_next, 1_920_000);

        let spurious = ForkId::new(&config, genesis, 0, 2_675_000);
        assert_eq!(spurious.fork_hash, H32::from_str("3edd5b10").unwrap());
        assert_eq!(spurious.fork_next, 4_370_000);

        let muir = ForkId::new(&config, genesis, 0, 9_200_000);
        assert_eq!(muir.fork_hash, H32::from_str("e029e991").unwrap());
        assert_eq!(muir.fork_next, 0);
    }

    #[test]
    fn encode_fork_id() {
        let fork = ForkId {
            fork_hash: H32::zero(),
            fork_next: 0,
        };
        assert_eq!(fork.encode_to_vec(), hex!("c6840000000080"));

        let fork = ForkId {
            fork_hash: H32::from_str("0xdeadbeef").unwrap(),
            fork_next: u64::from_str_radix("baddcafe", 16).unwrap(),
        };
        assert_eq!(fork.encode_to_vec(), hex!("ca84deadbeef84baddcafe"));
    }
}
