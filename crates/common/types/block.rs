use super::{
    Receipt, Transaction, BASE_FEE_MAX_CHANGE_DENOMINATOR, BLOB_BASE_FEE_UPDATE_FRACTION,
    ELASTICITY_MULTIPLIER, GAS_LIMIT_ADJUSTMENT_FACTOR, GAS_LIMIT_MINIMUM, INITIAL_BASE_FEE,
    MIN_BASE_FEE_PER_BLOB_GAS, TARGET_BLOB_GAS_PER_BLOCK,
};
use crate::{trie::ordered_trie_root, Address, H256, U256};
use bytes::Bytes;
use ethereum_types::Bloom;
use ethrun_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use keccak_hash::keccak;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::cmp::{max, Ordering};

pub type BlockHash = H256;
pub use super::chain_config::BlockNumber;

lazy_static! {
    /// Keccak256(rlp([])), the ommers hash of every post-merge block.
    pub static ref DEFAULT_OMMERS_HASH: H256 = H256::from_slice(
        &hex::decode("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347").unwrap()
    );
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.compute_block_hash()
    }
}

impl RLPEncode for Block {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.header)
            .encode_field(&self.body.transactions)
            .encode_field(&self.body.ommers)
            .encode_optional_field(&self.body.withdrawals)
            .finish();
    }
}

impl RLPDecode for Block {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (header, decoder) = decoder.decode_field("header")?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let (ommers, decoder) = decoder.decode_field("ommers")?;
        let (withdrawals, decoder) = decoder.decode_optional_field();
        let remaining = decoder.finish()?;
        let body = BlockBody {
            transactions,
            ommers,
            withdrawals,
        };
        Ok((Block { header, body }, remaining))
    }
}

/// Header part of a block on the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub parent_hash: H256,
    #[serde(rename(serialize = "sha3Uncles"))]
    pub ommers_hash: H256,
    #[serde(rename(serialize = "miner"))]
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    #[serde(default)]
    pub difficulty: U256,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub number: BlockNumber,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub gas_limit: u64,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub gas_used: u64,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub timestamp: u64,
    #[serde(with = "crate::serde_utils::bytes")]
    pub extra_data: Bytes,
    #[serde(rename(serialize = "mixHash"))]
    pub prev_randao: H256,
    #[serde(with = "crate::serde_utils::u64::hex_str_padding")]
    pub nonce: u64,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub base_fee_per_gas: Option<u64>,
    #[serde(default)]
    pub withdrawals_root: Option<H256>,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub blob_gas_used: Option<u64>,
    #[serde(default, with = "crate::serde_utils::u64::hex_str_opt")]
    pub excess_blob_gas: Option<u64>,
    #[serde(default)]
    pub parent_beacon_block_root: Option<H256>,
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.ommers_hash)
            .encode_field(&self.coinbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.receipts_root)
            .encode_field(&self.logs_bloom)
            .encode_field(&self.difficulty)
            .encode_field(&self.number)
            .encode_field(&self.gas_limit)
            .encode_field(&self.gas_used)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .encode_field(&self.prev_randao)
            .encode_field(&self.nonce.to_be_bytes())
            .encode_optional_field(&self.base_fee_per_gas)
            .encode_optional_field(&self.withdrawals_root)
            .encode_optional_field(&self.blob_gas_used)
            .encode_optional_field(&self.excess_blob_gas)
            .encode_optional_field(&self.parent_beacon_block_root)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parent_hash")?;
        let (ommers_hash, decoder) = decoder.decode_field("ommers_hash")?;
        let (coinbase, decoder) = decoder.decode_field("coinbase")?;
        let (state_root, decoder) = decoder.decode_field("state_root")?;
        let (transactions_root, decoder) = decoder.decode_field("transactions_root")?;
        let (receipts_root, decoder) = decoder.decode_field("receipts_root")?;
        let (logs_bloom, decoder) = decoder.decode_field("logs_bloom")?;
        let (difficulty, decoder) = decoder.decode_field("difficulty")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (gas_used, decoder) = decoder.decode_field("gas_used")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        let (extra_data, decoder) = decoder.decode_field("extra_data")?;
        let (prev_randao, decoder) = decoder.decode_field("prev_randao")?;
        let (nonce, decoder): ([u8; 8], _) = decoder.decode_field("nonce")?;
        let nonce = u64::from_be_bytes(nonce);
        let (base_fee_per_gas, decoder) = decoder.decode_optional_field();
        let (withdrawals_root, decoder) = decoder.decode_optional_field();
        let (blob_gas_used, decoder) = decoder.decode_optional_field();
        let (excess_blob_gas, decoder) = decoder.decode_optional_field();
        let (parent_beacon_block_root, decoder) = decoder.decode_optional_field();

        Ok((
            BlockHeader {
                parent_hash,
                ommers_hash,
                coinbase,
                state_root,
                transactions_root,
                receipts_root,
                logs_bloom,
                difficulty,
                number,
                gas_limit,
                gas_used,
                timestamp,
                extra_data,
                prev_randao,
                nonce,
                base_fee_per_gas,
                withdrawals_root,
                blob_gas_used,
                excess_blob_gas,
                parent_beacon_block_root,
            },
            decoder.finish()?,
        ))
    }
}

/// The body of a block on the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
    #[serde(rename(serialize = "uncles"))]
    pub ommers: Vec<BlockHeader>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl BlockBody {
    pub const fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            ommers: Vec::new(),
            withdrawals: Some(Vec::new()),
        }
    }
}

impl RLPEncode for BlockBody {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.transactions)
            .encode_field(&self.ommers)
            .encode_optional_field(&self.withdrawals)
            .finish();
    }
}

impl RLPDecode for BlockBody {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let (ommers, decoder) = decoder.decode_field("ommers")?;
        let (withdrawals, decoder) = decoder.decode_optional_field();
        Ok((
            BlockBody {
                transactions,
                ommers,
                withdrawals,
            },
            decoder.finish()?,
        ))
    }
}

pub fn compute_transactions_root(transactions: &[Transaction]) -> H256 {
    // Value: tx_type || RLP(tx)  if tx_type != 0
    //                   RLP(tx)  else
    ordered_trie_root(transactions.iter().map(|tx| tx.encode_canonical_to_vec()))
}

pub fn compute_receipts_root(receipts: &[Receipt]) -> H256 {
    ordered_trie_root(receipts.iter().map(|receipt| receipt.encode_to_vec()))
}

// See [EIP-4895](https://eips.ethereum.org/EIPS/eip-4895)
pub fn compute_withdrawals_root(withdrawals: &[Withdrawal]) -> H256 {
    ordered_trie_root(withdrawals.iter().map(|withdrawal| withdrawal.encode_to_vec()))
}

impl BlockHeader {
    pub fn compute_block_hash(&self) -> H256 {
        let mut buf = vec![];
        self.encode(&mut buf);
        keccak(buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub index: u64,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub validator_index: u64,
    pub address: Address,
    /// Amount in gwei.
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub amount: u64,
}

impl RLPEncode for Withdrawal {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.index)
            .encode_field(&self.validator_index)
            .encode_field(&self.address)
            .encode_field(&self.amount)
            .finish();
    }
}

impl RLPDecode for Withdrawal {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (index, decoder) = decoder.decode_field("index")?;
        let (validator_index, decoder) = decoder.decode_field("validator_index")?;
        let (address, decoder) = decoder.decode_field("address")?;
        let (amount, decoder) = decoder.decode_field("amount")?;
        Ok((
            Withdrawal {
                index,
                validator_index,
                address,
                amount,
            },
            decoder.finish()?,
        ))
    }
}

/// Checks that a gas limit stays within the adjustment bounds set by its
/// parent block.
pub fn check_gas_limit(gas_limit: u64, parent_gas_limit: u64) -> bool {
    let max_adjustment_delta = parent_gas_limit / GAS_LIMIT_ADJUSTMENT_FACTOR;

    gas_limit < parent_gas_limit + max_adjustment_delta
        && gas_limit > parent_gas_limit - max_adjustment_delta
        && gas_limit >= GAS_LIMIT_MINIMUM
}

/// Base fee per blob gas derived from the parent's excess blob gas
/// (EIP-4844).
pub fn calculate_base_fee_per_blob_gas(parent_excess_blob_gas: u64) -> u64 {
    fake_exponential(
        MIN_BASE_FEE_PER_BLOB_GAS,
        parent_excess_blob_gas,
        BLOB_BASE_FEE_UPDATE_FRACTION,
    )
}

// Approximates factor * e ** (numerator / denominator) using Taylor expansion,
// as defined in EIP-4844.
pub fn fake_exponential(factor: u64, numerator: u64, denominator: u64) -> u64 {
    let mut i = 1u128;
    let mut output = 0u128;
    let mut numerator_accum = factor as u128 * denominator as u128;
    while numerator_accum > 0 {
        output += numerator_accum;
        numerator_accum = numerator_accum * numerator as u128 / (denominator as u128 * i);
        i += 1;
    }
    (output / denominator as u128) as u64
}

/// Excess blob gas of a block given its parent's values (EIP-4844).
pub fn calc_excess_blob_gas(parent_excess_blob_gas: u64, parent_blob_gas_used: u64) -> u64 {
    let consumed = parent_excess_blob_gas + parent_blob_gas_used;
    consumed.saturating_sub(TARGET_BLOB_GAS_PER_BLOCK)
}

/// Base fee for a block given its gas limit and the parent's gas numbers
/// (EIP-1559). Returns None when the gas limit breaks the parent bounds.
pub fn calculate_base_fee_per_gas(
    block_gas_limit: u64,
    parent_gas_limit: u64,
    parent_gas_used: u64,
    parent_base_fee_per_gas: u64,
) -> Option<u64> {
    if !check_gas_limit(block_gas_limit, parent_gas_limit) {
        return None;
    }

    let parent_gas_target = parent_gas_limit / ELASTICITY_MULTIPLIER;

    Some(match parent_gas_used.cmp(&parent_gas_target) {
        Ordering::Equal => parent_base_fee_per_gas,
        Ordering::Greater => {
            let gas_used_delta = parent_gas_used - parent_gas_target;
            let parent_fee_gas_delta = parent_base_fee_per_gas as u128 * gas_used_delta as u128;
            let target_fee_gas_delta = parent_fee_gas_delta / parent_gas_target as u128;
            let base_fee_per_gas_delta = max(
                target_fee_gas_delta / BASE_FEE_MAX_CHANGE_DENOMINATOR as u128,
                1,
            );
            parent_base_fee_per_gas + base_fee_per_gas_delta as u64
        }
        Ordering::Less => {
            let gas_used_delta = parent_gas_target - parent_gas_used;
            let parent_fee_gas_delta = parent_base_fee_per_gas as u128 * gas_used_delta as u128;
            let target_fee_gas_delta = parent_fee_gas_delta / parent_gas_target as u128;
            let base_fee_per_gas_delta =
                target_fee_gas_delta / BASE_FEE_MAX_CHANGE_DENOMINATOR as u128;
            parent_base_fee_per_gas - base_fee_per_gas_delta as u64
        }
    })
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidBlockHeaderError {
    #[error("Gas used is greater than gas limit")]
    GasUsedGreaterThanGasLimit,
    #[error("Base fee per gas is incorrect")]
    BaseFeePerGasIncorrect,
    #[error("Timestamp is not greater than parent timestamp")]
    TimestampNotGreaterThanParent,
    #[error("Block number is not one greater than parent number")]
    BlockNumberNotOneGreater,
    #[error("Extra data is too long")]
    ExtraDataTooLong,
    #[error("Difficulty is not zero")]
    DifficultyNotZero,
    #[error("Nonce is not zero")]
    NonceNotZero,
    #[error("Ommers hash is not the default")]
    OmmersHashNotDefault,
    #[error("Parent hash is incorrect")]
    ParentHashIncorrect,
    #[error("Excess blob gas is not present")]
    ExcessBlobGasNotPresent,
    #[error("Blob gas used is not present")]
    BlobGasUsedNotPresent,
    #[error("Excess blob gas is incorrect")]
    ExcessBlobGasIncorrect,
    #[error("Excess blob gas is present")]
    ExcessBlobGasPresent,
    #[error("Blob gas used is present")]
    BlobGasUsedPresent,
}

/// Validates the post-merge header fields against the parent header.
pub fn validate_block_header(
    header: &BlockHeader,
    parent_header: &BlockHeader,
) -> Result<(), InvalidBlockHeaderError> {
    if header.gas_used > header.gas_limit {
        return Err(InvalidBlockHeaderError::GasUsedGreaterThanGasLimit);
    }

    let expected_base_fee_per_gas = calculate_base_fee_per_gas(
        header.gas_limit,
        parent_header.gas_limit,
        parent_header.gas_used,
        parent_header.base_fee_per_gas.unwrap_or(INITIAL_BASE_FEE),
    )
    .ok_or(InvalidBlockHeaderError::BaseFeePerGasIncorrect)?;
    if expected_base_fee_per_gas != header.base_fee_per_gas.unwrap_or(INITIAL_BASE_FEE) {
        return Err(InvalidBlockHeaderError::BaseFeePerGasIncorrect);
    }

    if header.timestamp <= parent_header.timestamp {
        return Err(InvalidBlockHeaderError::TimestampNotGreaterThanParent);
    }

    if header.number != parent_header.number + 1 {
        return Err(InvalidBlockHeaderError::BlockNumberNotOneGreater);
    }

    if header.extra_data.len() > 32 {
        return Err(InvalidBlockHeaderError::ExtraDataTooLong);
    }

    if !header.difficulty.is_zero() {
        return Err(InvalidBlockHeaderError::DifficultyNotZero);
    }

    if header.nonce != 0 {
        return Err(InvalidBlockHeaderError::NonceNotZero);
    }

    if header.ommers_hash != *DEFAULT_OMMERS_HASH {
        return Err(InvalidBlockHeaderError::OmmersHashNotDefault);
    }

    if header.parent_hash != parent_header.compute_block_hash() {
        return Err(InvalidBlockHeaderError::ParentHashIncorrect);
    }

    Ok(())
}

/// Validates that the Cancun blob fields are present and consistent with the
/// parent header.
pub fn validate_cancun_header_fields(
    header: &BlockHeader,
    parent_header: &BlockHeader,
) -> Result<(), InvalidBlockHeaderError> {
    let excess_blob_gas = header
        .excess_blob_gas
        .ok_or(InvalidBlockHeaderError::ExcessBlobGasNotPresent)?;
    if header.blob_gas_used.is_none() {
        return Err(InvalidBlockHeaderError::BlobGasUsedNotPresent);
    }
    let expected = calc_excess_blob_gas(
        parent_header.excess_blob_gas.unwrap_or_default(),
        parent_header.blob_gas_used.unwrap_or_default(),
    );
    if excess_blob_gas != expected {
        return Err(InvalidBlockHeaderError::ExcessBlobGasIncorrect);
    }
    Ok(())
}

/// Pre-Cancun headers must not carry blob fields.
pub fn validate_no_cancun_header_fields(
    header: &BlockHeader,
) -> Result<(), InvalidBlockHeaderError> {
    if header.excess_blob_gas.is_some() {
        return Err(InvalidBlockHeaderError::ExcessBlobGasPresent);
    }
    if header.blob_gas_used.is_some() {
        return Err(InvalidBlockHeaderError::BlobGasUsedPresent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H160;
    use hex_literal::hex;

    #[test]
    fn base_fee_constant_at_target_usage() {
        let gas_limit = 30_000_000;
        let base_fee = calculate_base_fee_per_gas(
            gas_limit,
            gas_limit,
            gas_limit / ELASTICITY_MULTIPLIER,
            INITIAL_BASE_FEE,
        );
        assert_eq!(base_fee, Some(INITIAL_BASE_FEE));
    }

    #[test]
    fn base_fee_rises_at_full_usage() {
        let gas_limit = 30_000_000;
        let base_fee =
            calculate_base_fee_per_gas(gas_limit, gas_limit, gas_limit, INITIAL_BASE_FEE).unwrap();
        // Full blocks move the base fee up by 1/8.
        assert_eq!(
            base_fee,
            INITIAL_BASE_FEE + INITIAL_BASE_FEE / BASE_FEE_MAX_CHANGE_DENOMINATOR
        );
    }

    #[test]
    fn base_fee_drops_on_empty_block() {
        let gas_limit = 30_000_000;
        let base_fee =
            calculate_base_fee_per_gas(gas_limit, gas_limit, 0, INITIAL_BASE_FEE).unwrap();
        assert_eq!(
            base_fee,
            INITIAL_BASE_FEE - INITIAL_BASE_FEE / BASE_FEE_MAX_CHANGE_DENOMINATOR
        );
    }

    #[test]
    fn gas_limit_bounds() {
        assert!(check_gas_limit(30_000_000, 30_000_000));
        assert!(check_gas_limit(30_029_000, 30_000_000));
        assert!(!check_gas_limit(31_000_000, 30_000_000));
        assert!(!check_gas_limit(4000, 5000));
    }

    #[test]
    fn excess_blob_gas_accumulates() {
        assert_eq!(calc_excess_blob_gas(0, 0), 0);
        // Below-target usage drains to zero.
        assert_eq!(calc_excess_blob_gas(0, 131_072), 0);
        // Above-target usage accumulates the surplus.
        assert_eq!(
            calc_excess_blob_gas(0, 786_432),
            786_432 - TARGET_BLOB_GAS_PER_BLOCK
        );
        assert_eq!(
            calc_excess_blob_gas(393_216, 393_216),
            393_216
        );
    }

    #[test]
    fn blob_base_fee_grows_with_excess() {
        assert_eq!(calculate_base_fee_per_blob_gas(0), 1);
        let low = calculate_base_fee_per_blob_gas(TARGET_BLOB_GAS_PER_BLOCK);
        let high = calculate_base_fee_per_blob_gas(10 * TARGET_BLOB_GAS_PER_BLOCK);
        assert!(high >= low);
    }

    #[test]
    fn test_compute_withdrawals_root() {
        // Source: https://github.com/ethereum/tests/blob/9760400e667eba241265016b02644ef62ab55de2/BlockchainTests/EIPTests/bc4895-withdrawals/amountIs0.json
        let withdrawals = vec![Withdrawal {
            index: 0x00,
            validator_index: 0x00,
            address: H160::from_slice(&hex!("c94f5374fce5edbc8e2a8697c15331677e6ebf0b")),
            amount: 0x00_u64,
        }];
        let expected_root = H256::from_slice(&hex!(
            "48a703da164234812273ea083e4ec3d09d028300cd325b46a6a75402e5a7ab95"
        ));
        assert_eq!(compute_withdrawals_root(&withdrawals), expected_root);
    }

    #[test]
    fn header_rlp_roundtrip_with_cancun_fields() {
        let header = BlockHeader {
            parent_hash: H256::repeat_byte(1),
            ommers_hash: *DEFAULT_OMMERS_HASH,
            coinbase: Address::repeat_byte(2),
            state_root: H256::repeat_byte(3),
            transactions_root: H256::repeat_byte(4),
            receipts_root: H256::repeat_byte(5),
            logs_bloom: Bloom::zero(),
            difficulty: U256::zero(),
            number: 100,
            gas_limit: 30_000_000,
            gas_used: 12_345,
            timestamp: 1_700_000_000,
            extra_data: Bytes::from_static(b"ethrun"),
            prev_randao: H256::repeat_byte(6),
            nonce: 0,
            base_fee_per_gas: Some(7),
            withdrawals_root: Some(H256::repeat_byte(8)),
            blob_gas_used: Some(0),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(H256::zero()),
        };
        let encoded = header.encode_to_vec();
        assert_eq!(BlockHeader::decode(&encoded).unwrap(), header);
    }
}
