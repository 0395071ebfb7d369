use std::cmp::min;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
pub use mempool::MempoolTransaction;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};
use serde::{ser::SerializeStruct, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use ethrun_rlp::{
    constants::RLP_NULL,
    decode::{get_rlp_bytes_item_payload, is_encoded_as_bytes, RLPDecode},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::chain_spec::ChainSpec;
use crate::params::ParamTopic;
use crate::types::{GAS_PER_BLOB, MAX_BLOBS_PER_BLOCK, SECP256K1_ORDER_HALF};

pub type AccessList = Vec<(Address, Vec<H256>)>;

/// A typed transaction (EIP-2718 sum of the four supported shapes).
///
/// Serde serialization is untagged: each variant carries its own `type`
/// field, so the enum flattens into the RPC object shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Transaction {
    LegacyTransaction(LegacyTransaction),
    EIP2930Transaction(EIP2930Transaction),
    EIP1559Transaction(EIP1559Transaction),
    EIP4844Transaction(EIP4844Transaction),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    /// The recipient of the transaction.
    /// Create transactions contain a [`null`](RLP_NULL) value in this field.
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP2930Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u64,
    pub max_fee_per_gas: u64,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EIP4844Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u64,
    pub max_fee_per_gas: u64,
    pub gas_limit: u64,
    /// Blob transactions cannot create contracts.
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
    pub max_fee_per_blob_gas: U256,
    pub blob_versioned_hashes: Vec<H256>,
    pub signature_y_parity: bool,
    pub signature_r: U256,
    pub signature_s: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum TxType {
    #[default]
    Legacy = 0x00,
    EIP2930 = 0x01,
    EIP1559 = 0x02,
    EIP4844 = 0x03,
}

impl TxType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Legacy),
            0x01 => Some(Self::EIP2930),
            0x02 => Some(Self::EIP1559),
            0x03 => Some(Self::EIP4844),
            _ => None,
        }
    }
}

/// The transaction's kind: call or create.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum TxKind {
    Call(Address),
    #[default]
    Create,
}

impl RLPEncode for TxKind {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            Self::Call(address) => address.encode(buf),
            Self::Create => buf.put_u8(RLP_NULL),
        }
    }
}

impl RLPDecode for TxKind {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        if *first_byte == RLP_NULL {
            return Ok((Self::Create, &rlp[1..]));
        }
        Address::decode_unfinished(rlp).map(|(addr, rest)| (Self::Call(addr), rest))
    }
}

/// Stateless validation failures, surfaced before a transaction touches any
/// state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTransaction {
    #[error("transaction type {0:?} is not activated on this chain")]
    TypeNotActivated(TxType),
    #[error("chain id mismatch: expected {expected}, got {got}")]
    ChainIdMismatch { expected: u64, got: u64 },
    #[error("gas limit times gas price overflows")]
    GasOverflow,
    #[error("max priority fee per gas is greater than max fee per gas")]
    PriorityFeeGreaterThanMaxFee,
    #[error("signature s value is in the upper half of the curve order")]
    HighS,
    #[error("legacy signature v value {0} is malformed")]
    InvalidV(U256),
    #[error("blob transaction carries {0} versioned hashes")]
    BlobCountOutOfRange(usize),
    #[error("versioned hash does not start with the KZG version byte")]
    InvalidVersionedHashVersion,
    #[error("signature could not be recovered")]
    InvalidSignature,
}

impl Transaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::LegacyTransaction(_) => TxType::Legacy,
            Transaction::EIP2930Transaction(_) => TxType::EIP2930,
            Transaction::EIP1559Transaction(_) => TxType::EIP1559,
            Transaction::EIP4844Transaction(_) => TxType::EIP4844,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Transaction::LegacyTransaction(tx) => tx.nonce,
            Transaction::EIP2930Transaction(tx) => tx.nonce,
            Transaction::EIP1559Transaction(tx) => tx.nonce,
            Transaction::EIP4844Transaction(tx) => tx.nonce,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            Transaction::LegacyTransaction(tx) => tx.gas_limit,
            Transaction::EIP2930Transaction(tx) => tx.gas_limit,
            Transaction::EIP1559Transaction(tx) => tx.gas_limit,
            Transaction::EIP4844Transaction(tx) => tx.gas_limit,
        }
    }

    /// The fee-cap side of the price: `gas_price` for pre-1559 shapes,
    /// `max_fee_per_gas` for fee-market shapes.
    pub fn gas_price(&self) -> u64 {
        match self {
            Transaction::LegacyTransaction(tx) => tx.gas_price,
            Transaction::EIP2930Transaction(tx) => tx.gas_price,
            Transaction::EIP1559Transaction(tx) => tx.max_fee_per_gas,
            Transaction::EIP4844Transaction(tx) => tx.max_fee_per_gas,
        }
    }

    pub fn to(&self) -> TxKind {
        match self {
            Transaction::LegacyTransaction(tx) => tx.to.clone(),
            Transaction::EIP2930Transaction(tx) => tx.to.clone(),
            Transaction::EIP1559Transaction(tx) => tx.to.clone(),
            Transaction::EIP4844Transaction(tx) => TxKind::Call(tx.to),
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Transaction::LegacyTransaction(tx) => tx.value,
            Transaction::EIP2930Transaction(tx) => tx.value,
            Transaction::EIP1559Transaction(tx) => tx.value,
            Transaction::EIP4844Transaction(tx) => tx.value,
        }
    }

    pub fn data(&self) -> &Bytes {
        match self {
            Transaction::LegacyTransaction(tx) => &tx.data,
            Transaction::EIP2930Transaction(tx) => &tx.data,
            Transaction::EIP1559Transaction(tx) => &tx.data,
            Transaction::EIP4844Transaction(tx) => &tx.data,
        }
    }

    pub fn access_list(&self) -> &[(Address, Vec<H256>)] {
        match self {
            Transaction::LegacyTransaction(_) => &[],
            Transaction::EIP2930Transaction(tx) => &tx.access_list,
            Transaction::EIP1559Transaction(tx) => &tx.access_list,
            Transaction::EIP4844Transaction(tx) => &tx.access_list,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Transaction::LegacyTransaction(tx) => derive_legacy_chain_id(tx.v),
            Transaction::EIP2930Transaction(tx) => Some(tx.chain_id),
            Transaction::EIP1559Transaction(tx) => Some(tx.chain_id),
            Transaction::EIP4844Transaction(tx) => Some(tx.chain_id),
        }
    }

    pub fn max_fee_per_gas(&self) -> Option<u64> {
        match self {
            Transaction::EIP1559Transaction(tx) => Some(tx.max_fee_per_gas),
            Transaction::EIP4844Transaction(tx) => Some(tx.max_fee_per_gas),
            _ => None,
        }
    }

    pub fn max_priority_fee(&self) -> Option<u64> {
        match self {
            Transaction::EIP1559Transaction(tx) => Some(tx.max_priority_fee_per_gas),
            Transaction::EIP4844Transaction(tx) => Some(tx.max_priority_fee_per_gas),
            _ => None,
        }
    }

    pub fn max_fee_per_blob_gas(&self) -> Option<U256> {
        match self {
            Transaction::EIP4844Transaction(tx) => Some(tx.max_fee_per_blob_gas),
            _ => None,
        }
    }

    pub fn blob_versioned_hashes(&self) -> &[H256] {
        match self {
            Transaction::EIP4844Transaction(tx) => &tx.blob_versioned_hashes,
            _ => &[],
        }
    }

    /// Blob gas consumed by this transaction (EIP-4844).
    pub fn blob_gas(&self) -> u64 {
        self.blob_versioned_hashes().len() as u64 * GAS_PER_BLOB
    }

    pub fn is_contract_creation(&self) -> bool {
        matches!(self.to(), TxKind::Create)
    }

    pub fn gas_tip_cap(&self) -> u64 {
        self.max_priority_fee().unwrap_or(self.gas_price())
    }

    pub fn gas_fee_cap(&self) -> u64 {
        self.max_fee_per_gas().unwrap_or(self.gas_price())
    }

    /// The tip actually earned per gas at the given base fee, `None` when the
    /// fee cap does not even cover the base fee.
    pub fn effective_gas_tip(&self, base_fee: Option<u64>) -> Option<u64> {
        let Some(base_fee) = base_fee else {
            return Some(self.gas_tip_cap());
        };
        self.gas_fee_cap()
            .checked_sub(base_fee)
            .map(|tip| min(tip, self.gas_tip_cap()))
    }

    /// The per-gas price actually paid at the given base fee.
    pub fn effective_gas_price(&self, base_fee: Option<u64>) -> Option<u64> {
        match self.tx_type() {
            TxType::Legacy | TxType::EIP2930 => Some(self.gas_price()),
            TxType::EIP1559 | TxType::EIP4844 => {
                let base_fee = base_fee?;
                let priority = min(
                    self.max_priority_fee()?,
                    self.max_fee_per_gas()?.checked_sub(base_fee)?,
                );
                Some(priority + base_fee)
            }
        }
    }

    /// Maximum wei the sender can spend: fee cap times gas limit, plus value,
    /// plus the blob fee cap.
    pub fn max_upfront_cost(&self) -> U256 {
        let gas_cost = U256::from(self.gas_price()) * U256::from(self.gas_limit());
        let blob_cost = self
            .max_fee_per_blob_gas()
            .map(|fee| fee.saturating_mul(self.blob_gas().into()))
            .unwrap_or_default();
        gas_cost
            .saturating_add(blob_cost)
            .saturating_add(self.value())
    }

    /// Whether the transaction is replay-protected (EIP-155).
    pub fn protected(&self) -> bool {
        match self {
            Transaction::LegacyTransaction(tx) if tx.v.bits() <= 8 => {
                let v = tx.v.as_u64();
                v != 27 && v != 28 && v != 1 && v != 0
            }
            _ => true,
        }
    }

    pub fn compute_hash(&self) -> H256 {
        keccak_hash::keccak(self.encode_canonical_to_vec())
    }

    /// The byte string whose keccak digest is signed.
    pub fn signature_payload(&self) -> Vec<u8> {
        match self {
            Transaction::LegacyTransaction(tx) => {
                tx.signature_payload(derive_legacy_chain_id(tx.v))
            }
            Transaction::EIP2930Transaction(tx) => tx.signature_payload(),
            Transaction::EIP1559Transaction(tx) => tx.signature_payload(),
            Transaction::EIP4844Transaction(tx) => tx.signature_payload(),
        }
    }

    /// Recovers the sender's uncompressed public key (64 bytes).
    pub fn sender_public_key(&self) -> Result<[u8; 64], InvalidTransaction> {
        let (r, s, y_parity, payload) = match self {
            Transaction::LegacyTransaction(tx) => {
                let y_parity = match derive_legacy_chain_id(tx.v) {
                    Some(chain_id) => tx.v.as_u64().saturating_sub(35 + chain_id * 2) != 0,
                    None => tx.v.as_u64().saturating_sub(27) != 0,
                };
                (
                    tx.r,
                    tx.s,
                    y_parity,
                    tx.signature_payload(derive_legacy_chain_id(tx.v)),
                )
            }
            Transaction::EIP2930Transaction(tx) => (
                tx.signature_r,
                tx.signature_s,
                tx.signature_y_parity,
                tx.signature_payload(),
            ),
            Transaction::EIP1559Transaction(tx) => (
                tx.signature_r,
                tx.signature_s,
                tx.signature_y_parity,
                tx.signature_payload(),
            ),
            Transaction::EIP4844Transaction(tx) => (
                tx.signature_r,
                tx.signature_s,
                tx.signature_y_parity,
                tx.signature_payload(),
            ),
        };
        recover_public_key(&r, &s, y_parity, &payload)
    }

    /// Recovers the sender address from the signature.
    pub fn sender(&self) -> Result<Address, InvalidTransaction> {
        let public_key = self.sender_public_key()?;
        Ok(public_key_to_address(&public_key))
    }

    /// Signs the transaction in place with the given key. For unprotected
    /// legacy transactions pass `chain_id: None`; typed transactions carry
    /// their own chain id.
    pub fn sign(&mut self, secret_key: &SecretKey, chain_id: Option<u64>) {
        match self {
            Transaction::LegacyTransaction(tx) => tx.sign(secret_key, chain_id),
            Transaction::EIP2930Transaction(tx) => tx.sign(secret_key),
            Transaction::EIP1559Transaction(tx) => tx.sign(secret_key),
            Transaction::EIP4844Transaction(tx) => tx.sign(secret_key),
        }
    }

    /// Stateless validation against the chain spec: type activation, chain
    /// id, fee ordering, signature malleability, blob shape.
    pub fn validate(&self, spec: &ChainSpec) -> Result<(), InvalidTransaction> {
        let required_eip = match self.tx_type() {
            TxType::Legacy => None,
            TxType::EIP2930 => Some(2930),
            TxType::EIP1559 => Some(1559),
            TxType::EIP4844 => Some(4844),
        };
        if let Some(eip) = required_eip {
            if !spec.is_activated_eip(eip) {
                return Err(InvalidTransaction::TypeNotActivated(self.tx_type()));
            }
        }

        match self.chain_id() {
            Some(chain_id) if chain_id != spec.chain_id() => {
                return Err(InvalidTransaction::ChainIdMismatch {
                    expected: spec.chain_id(),
                    got: chain_id,
                });
            }
            _ => {}
        }

        if let Transaction::LegacyTransaction(tx) = self {
            if !self.protected() {
                let v = tx.v;
                if v != U256::from(27) && v != U256::from(28) {
                    return Err(InvalidTransaction::InvalidV(v));
                }
            }
        }

        if let (Some(max_fee), Some(priority_fee)) = (self.max_fee_per_gas(), self.max_priority_fee())
        {
            if priority_fee > max_fee {
                return Err(InvalidTransaction::PriorityFeeGreaterThanMaxFee);
            }
        }

        let s = match self {
            Transaction::LegacyTransaction(tx) => tx.s,
            Transaction::EIP2930Transaction(tx) => tx.signature_s,
            Transaction::EIP1559Transaction(tx) => tx.signature_s,
            Transaction::EIP4844Transaction(tx) => tx.signature_s,
        };
        if s > *SECP256K1_ORDER_HALF {
            return Err(InvalidTransaction::HighS);
        }

        if let Transaction::EIP4844Transaction(tx) = self {
            let count = tx.blob_versioned_hashes.len();
            if count == 0 || count as u64 > MAX_BLOBS_PER_BLOCK {
                return Err(InvalidTransaction::BlobCountOutOfRange(count));
            }
            let version: u64 = spec
                .param(ParamTopic::Sharding, "blobCommitmentVersionKzg")
                .low_u64();
            for hash in &tx.blob_versioned_hashes {
                if u64::from(hash[0]) != version {
                    return Err(InvalidTransaction::InvalidVersionedHashVersion);
                }
            }
        }

        Ok(())
    }
}

impl LegacyTransaction {
    /// Pre-EIP-155 payload is the six fields; protected payload appends
    /// `[chain_id, 0, 0]`.
    pub fn signature_payload(&self, chain_id: Option<u64>) -> Vec<u8> {
        let mut buf = vec![];
        match chain_id {
            None => Encoder::new(&mut buf)
                .encode_field(&self.nonce)
                .encode_field(&self.gas_price)
                .encode_field(&self.gas_limit)
                .encode_field(&self.to)
                .encode_field(&self.value)
                .encode_field(&self.data)
                .finish(),
            Some(chain_id) => Encoder::new(&mut buf)
                .encode_field(&self.nonce)
                .encode_field(&self.gas_price)
                .encode_field(&self.gas_limit)
                .encode_field(&self.to)
                .encode_field(&self.value)
                .encode_field(&self.data)
                .encode_field(&chain_id)
                .encode_field(&0u8)
                .encode_field(&0u8)
                .finish(),
        }
        buf
    }

    pub fn sign(&mut self, secret_key: &SecretKey, chain_id: Option<u64>) {
        let (recovery_id, r, s) = sign_payload(&self.signature_payload(chain_id), secret_key);
        self.v = match chain_id {
            Some(chain_id) => U256::from(chain_id * 2 + 35 + recovery_id),
            None => U256::from(27 + recovery_id),
        };
        self.r = r;
        self.s = s;
    }
}

impl EIP2930Transaction {
    pub fn signature_payload(&self) -> Vec<u8> {
        let mut buf = vec![TxType::EIP2930 as u8];
        Encoder::new(&mut buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .finish();
        buf
    }

    pub fn sign(&mut self, secret_key: &SecretKey) {
        let (recovery_id, r, s) = sign_payload(&self.signature_payload(), secret_key);
        self.signature_y_parity = recovery_id != 0;
        self.signature_r = r;
        self.signature_s = s;
    }
}

impl EIP1559Transaction {
    pub fn signature_payload(&self) -> Vec<u8> {
        let mut buf = vec![TxType::EIP1559 as u8];
        Encoder::new(&mut buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .finish();
        buf
    }

    pub fn sign(&mut self, secret_key: &SecretKey) {
        let (recovery_id, r, s) = sign_payload(&self.signature_payload(), secret_key);
        self.signature_y_parity = recovery_id != 0;
        self.signature_r = r;
        self.signature_s = s;
    }
}

impl EIP4844Transaction {
    pub fn signature_payload(&self) -> Vec<u8> {
        let mut buf = vec![TxType::EIP4844 as u8];
        Encoder::new(&mut buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.max_fee_per_blob_gas)
            .encode_field(&self.blob_versioned_hashes)
            .finish();
        buf
    }

    pub fn sign(&mut self, secret_key: &SecretKey) {
        let (recovery_id, r, s) = sign_payload(&self.signature_payload(), secret_key);
        self.signature_y_parity = recovery_id != 0;
        self.signature_r = r;
        self.signature_s = s;
    }
}

fn sign_payload(payload: &[u8], secret_key: &SecretKey) -> (u64, U256, U256) {
    let digest: [u8; 32] = Keccak256::new_with_prefix(payload).finalize().into();
    let signature = SECP256K1
        .sign_ecdsa_recoverable(&Message::from_digest(digest), secret_key);
    let (recovery_id, bytes) = signature.serialize_compact();
    let r = U256::from_big_endian(&bytes[..32]);
    let s = U256::from_big_endian(&bytes[32..]);
    (recovery_id.to_i32() as u64, r, s)
}

fn recover_public_key(
    signature_r: &U256,
    signature_s: &U256,
    signature_y_parity: bool,
    payload: &[u8],
) -> Result<[u8; 64], InvalidTransaction> {
    let mut signature_bytes = [0u8; 64];
    signature_r.to_big_endian(&mut signature_bytes[..32]);
    signature_s.to_big_endian(&mut signature_bytes[32..]);
    let recovery_id = RecoveryId::from_i32(signature_y_parity as i32)
        .map_err(|_| InvalidTransaction::InvalidSignature)?;
    let signature = RecoverableSignature::from_compact(&signature_bytes, recovery_id)
        .map_err(|_| InvalidTransaction::InvalidSignature)?;

    let digest: [u8; 32] = Keccak256::new_with_prefix(payload).finalize().into();
    let public = SECP256K1
        .recover_ecdsa(&Message::from_digest(digest), &signature)
        .map_err(|_| InvalidTransaction::InvalidSignature)?;
    let mut uncompressed = [0u8; 64];
    uncompressed.copy_from_slice(&public.serialize_uncompressed()[1..]);
    Ok(uncompressed)
}

/// Last 20 bytes of the keccak digest of the uncompressed public key.
pub fn public_key_to_address(public_key: &[u8; 64]) -> Address {
    let hash = Keccak256::new_with_prefix(public_key).finalize();
    Address::from_slice(&hash[12..])
}

/// Address of the given secret key's public key.
pub fn address_from_secret_key(secret_key: &SecretKey) -> Address {
    let public = PublicKey::from_secret_key(SECP256K1, secret_key);
    let mut uncompressed = [0u8; 64];
    uncompressed.copy_from_slice(&public.serialize_uncompressed()[1..]);
    public_key_to_address(&uncompressed)
}

pub fn derive_legacy_chain_id(v: U256) -> Option<u64> {
    if v.bits() > 64 {
        return None;
    }
    let v = v.as_u64();
    if v == 27 || v == 28 {
        None
    } else {
        Some(v.saturating_sub(35) / 2)
    }
}

impl RLPEncode for LegacyTransaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.v)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .finish();
    }
}

impl RLPEncode for EIP2930Transaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish()
    }
}

impl RLPEncode for EIP1559Transaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish()
    }
}

impl RLPEncode for EIP4844Transaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.chain_id)
            .encode_field(&self.nonce)
            .encode_field(&self.max_priority_fee_per_gas)
            .encode_field(&self.max_fee_per_gas)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.access_list)
            .encode_field(&self.max_fee_per_blob_gas)
            .encode_field(&self.blob_versioned_hashes)
            .encode_field(&self.signature_y_parity)
            .encode_field(&self.signature_r)
            .encode_field(&self.signature_s)
            .finish()
    }
}

impl RLPDecode for LegacyTransaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(LegacyTransaction, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (v, decoder) = decoder.decode_field("v")?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            v,
            r,
            s,
        };
        Ok((tx, decoder.finish()?))
    }
}

impl RLPDecode for EIP2930Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(EIP2930Transaction, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;

        let tx = EIP2930Transaction {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            access_list,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, decoder.finish()?))
    }
}

impl RLPDecode for EIP1559Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(EIP1559Transaction, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (max_priority_fee_per_gas, decoder) =
            decoder.decode_field("max_priority_fee_per_gas")?;
        let (max_fee_per_gas, decoder) = decoder.decode_field("max_fee_per_gas")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;

        let tx = EIP1559Transaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            to,
            value,
            data,
            access_list,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, decoder.finish()?))
    }
}

impl RLPDecode for EIP4844Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(EIP4844Transaction, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (chain_id, decoder) = decoder.decode_field("chain_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (max_priority_fee_per_gas, decoder) =
            decoder.decode_field("max_priority_fee_per_gas")?;
        let (max_fee_per_gas, decoder) = decoder.decode_field("max_fee_per_gas")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (access_list, decoder) = decoder.decode_field("access_list")?;
        let (max_fee_per_blob_gas, decoder) = decoder.decode_field("max_fee_per_blob_gas")?;
        let (blob_versioned_hashes, decoder) = decoder.decode_field("blob_versioned_hashes")?;
        let (signature_y_parity, decoder) = decoder.decode_field("signature_y_parity")?;
        let (signature_r, decoder) = decoder.decode_field("signature_r")?;
        let (signature_s, decoder) = decoder.decode_field("signature_s")?;

        let tx = EIP4844Transaction {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            to,
            value,
            data,
            access_list,
            max_fee_per_blob_gas,
            blob_versioned_hashes,
            signature_y_parity,
            signature_r,
            signature_s,
        };
        Ok((tx, decoder.finish()?))
    }
}

impl RLPEncode for Transaction {
    /// Within block bodies, typed transactions are wrapped as byte strings
    /// while legacy transactions stay bare lists.
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            Transaction::LegacyTransaction(tx) => tx.encode(buf),
            tx => Bytes::from(tx.encode_canonical_to_vec()).encode(buf),
        };
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        if is_encoded_as_bytes(rlp)? {
            let payload = get_rlp_bytes_item_payload(rlp)?;
            let tx = Transaction::decode_canonical(payload)?;
            // Consume the byte-string item we just unwrapped.
            let (_, remaining) = ethrun_rlp::decode::decode_bytes(rlp)?;
            Ok((tx, remaining))
        } else {
            LegacyTransaction::decode_unfinished(rlp)
                .map(|(tx, remaining)| (Transaction::LegacyTransaction(tx), remaining))
        }
    }
}

/// Canonical transaction encoding per EIP-2718:
/// `type || rlp(fields)` for typed transactions, bare `rlp(fields)` for
/// legacy ones.
impl Transaction {
    pub fn decode_canonical(bytes: &[u8]) -> Result<Self, RLPDecodeError> {
        match bytes.first() {
            Some(tx_type) if *tx_type < 0x7f => {
                let payload = &bytes[1..];
                match TxType::from_u8(*tx_type) {
                    Some(TxType::EIP2930) => {
                        EIP2930Transaction::decode(payload).map(Transaction::EIP2930Transaction)
                    }
                    Some(TxType::EIP1559) => {
                        EIP1559Transaction::decode(payload).map(Transaction::EIP1559Transaction)
                    }
                    Some(TxType::EIP4844) => {
                        EIP4844Transaction::decode(payload).map(Transaction::EIP4844Transaction)
                    }
                    _ => Err(RLPDecodeError::WrongTxType(*tx_type)),
                }
            }
            _ => LegacyTransaction::decode(bytes).map(Transaction::LegacyTransaction),
        }
    }

    pub fn encode_canonical(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            Transaction::LegacyTransaction(_) => {}
            tx => buf.put_u8(tx.tx_type() as u8),
        }
        match self {
            Transaction::LegacyTransaction(tx) => tx.encode(buf),
            Transaction::EIP2930Transaction(tx) => tx.encode(buf),
            Transaction::EIP1559Transaction(tx) => tx.encode(buf),
            Transaction::EIP4844Transaction(tx) => tx.encode(buf),
        };
    }

    pub fn encode_canonical_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_canonical(&mut buf);
        buf
    }
}

// RPC-shaped JSON views of the transaction variants.
mod serde_impl {
    use super::*;
    use serde::Deserialize;
    use std::str::FromStr;

    impl Serialize for TxKind {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            match self {
                TxKind::Call(address) => serializer.serialize_str(&format!("{:#x}", address)),
                TxKind::Create => serializer.serialize_none(),
            }
        }
    }

    impl<'de> Deserialize<'de> for TxKind {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let value = Option::<String>::deserialize(deserializer)?;
            match value {
                Some(string) if !string.is_empty() => Ok(TxKind::Call(
                    Address::from_str(string.trim_start_matches("0x")).map_err(|_| {
                        serde::de::Error::custom(format!("invalid address: {string}"))
                    })?,
                )),
                _ => Ok(TxKind::Create),
            }
        }
    }

    impl Serialize for TxType {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(&format!("{:#x}", *self as u8))
        }
    }

    impl<'de> Deserialize<'de> for TxType {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let value = String::deserialize(deserializer)?;
            let tx_type = u8::from_str_radix(value.trim_start_matches("0x"), 16)
                .map_err(|_| serde::de::Error::custom(format!("invalid tx type: {value}")))?;
            TxType::from_u8(tx_type)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid tx type: {value}")))
        }
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct AccessListEntry {
        pub address: Address,
        pub storage_keys: Vec<H256>,
    }

    impl From<&(Address, Vec<H256>)> for AccessListEntry {
        fn from(value: &(Address, Vec<H256>)) -> AccessListEntry {
            AccessListEntry {
                address: value.0,
                storage_keys: value.1.clone(),
            }
        }
    }

    impl Serialize for LegacyTransaction {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let mut state = serializer.serialize_struct("LegacyTransaction", 11)?;
            state.serialize_field("type", &TxType::Legacy)?;
            state.serialize_field("nonce", &format!("{:#x}", self.nonce))?;
            state.serialize_field("to", &self.to)?;
            state.serialize_field("gas", &format!("{:#x}", self.gas_limit))?;
            state.serialize_field("value", &self.value)?;
            state.serialize_field("input", &format!("0x{:x}", self.data))?;
            state.serialize_field("gasPrice", &format!("{:#x}", self.gas_price))?;
            state.serialize_field(
                "chainId",
                &format!("{:#x}", derive_legacy_chain_id(self.v).unwrap_or_default()),
            )?;
            state.serialize_field("v", &self.v)?;
            state.serialize_field("r", &self.r)?;
            state.serialize_field("s", &self.s)?;
            state.end()
        }
    }

    impl Serialize for EIP2930Transaction {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let mut state = serializer.serialize_struct("EIP2930Transaction", 12)?;
            state.serialize_field("type", &TxType::EIP2930)?;
            state.serialize_field("nonce", &format!("{:#x}", self.nonce))?;
            state.serialize_field("to", &self.to)?;
            state.serialize_field("gas", &format!("{:#x}", self.gas_limit))?;
            state.serialize_field("value", &self.value)?;
            state.serialize_field("input", &format!("0x{:x}", self.data))?;
            state.serialize_field("gasPrice", &format!("{:#x}", self.gas_price))?;
            state.serialize_field(
                "accessList",
                &self
                    .access_list
                    .iter()
                    .map(AccessListEntry::from)
                    .collect::<Vec<_>>(),
            )?;
            state.serialize_field("chainId", &format!("{:#x}", self.chain_id))?;
            state.serialize_field("yParity", &format!("{:#x}", self.signature_y_parity as u8))?;
            state.serialize_field("r", &self.signature_r)?;
            state.serialize_field("s", &self.signature_s)?;
            state.end()
        }
    }

    impl Serialize for EIP1559Transaction {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let mut state = serializer.serialize_struct("EIP1559Transaction", 14)?;
            state.serialize_field("type", &TxType::EIP1559)?;
            state.serialize_field("nonce", &format!("{:#x}", self.nonce))?;
            state.serialize_field("to", &self.to)?;
            state.serialize_field("gas", &format!("{:#x}", self.gas_limit))?;
            state.serialize_field("value", &self.value)?;
            state.serialize_field("input", &format!("0x{:x}", self.data))?;
            state.serialize_field(
                "maxPriorityFeePerGas",
                &format!("{:#x}", self.max_priority_fee_per_gas),
            )?;
            state.serialize_field("maxFeePerGas", &format!("{:#x}", self.max_fee_per_gas))?;
            state.serialize_field(
                "accessList",
                &self
                    .access_list
                    .iter()
                    .map(AccessListEntry::from)
                    .collect::<Vec<_>>(),
            )?;
            state.serialize_field("chainId", &format!("{:#x}", self.chain_id))?;
            state.serialize_field("yParity", &format!("{:#x}", self.signature_y_parity as u8))?;
            state.serialize_field("r", &self.signature_r)?;
            state.serialize_field("s", &self.signature_s)?;
            state.end()
        }
    }

    impl Serialize for EIP4844Transaction {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let mut state = serializer.serialize_struct("EIP4844Transaction", 15)?;
            state.serialize_field("type", &TxType::EIP4844)?;
            state.serialize_field("nonce", &format!("{:#x}", self.nonce))?;
            state.serialize_field("to", &self.to)?;
            state.serialize_field("gas", &format!("{:#x}", self.gas_limit))?;
            state.serialize_field("value", &self.value)?;
            state.serialize_field("input", &format!("0x{:x}", self.data))?;
            state.serialize_field(
                "maxPriorityFeePerGas",
                &format!("{:#x}", self.max_priority_fee_per_gas),
            )?;
            state.serialize_field("maxFeePerGas", &format!("{:#x}", self.max_fee_per_gas))?;
            state.serialize_field(
                "maxFeePerBlobGas",
                &format!("{:#x}", self.max_fee_per_blob_gas),
            )?;
            state.serialize_field(
                "accessList",
                &self
                    .access_list
                    .iter()
                    .map(AccessListEntry::from)
                    .collect::<Vec<_>>(),
            )?;
            state.serialize_field("blobVersionedHashes", &self.blob_versioned_hashes)?;
            state.serialize_field("chainId", &format!("{:#x}", self.chain_id))?;
            state.serialize_field("yParity", &format!("{:#x}", self.signature_y_parity as u8))?;
            state.serialize_field("r", &self.signature_r)?;
            state.serialize_field("s", &self.signature_s)?;
            state.end()
        }
    }
}

mod mempool {
    use super::*;
    use std::cmp::Ordering;

    /// A pooled transaction together with its arrival time (used as an
    /// ordering tie-breaker) and its already-recovered sender.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct MempoolTransaction {
        timestamp: u128,
        sender: Address,
        inner: Transaction,
    }

    impl MempoolTransaction {
        pub fn new(timestamp: u128, sender: Address, tx: Transaction) -> Self {
            Self {
                timestamp,
                sender,
                inner: tx,
            }
        }

        pub fn time(&self) -> u128 {
            self.timestamp
        }

        pub fn sender(&self) -> Address {
            self.sender
        }

        pub fn transaction(&self) -> &Transaction {
            &self.inner
        }
    }

    impl std::ops::Deref for MempoolTransaction {
        type Target = Transaction;

        fn deref(&self) -> &Self::Target {
            &self.inner
        }
    }

    impl From<MempoolTransaction> for Transaction {
        fn from(tx: MempoolTransaction) -> Self {
            tx.inner
        }
    }

    // Orders by nonce, breaking ties in favor of the earlier arrival.
    impl Ord for MempoolTransaction {
        fn cmp(&self, other: &Self) -> Ordering {
            match self.nonce().cmp(&other.nonce()) {
                Ordering::Equal => self.time().cmp(&other.time()),
                ordering => ordering,
            }
        }
    }

    impl PartialOrd for MempoolTransaction {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fork;
    use hex_literal::hex;
    use std::str::FromStr;

    #[test]
    fn legacy_tx_rlp_decode() {
        let encoded_tx = hex!("f86d80843baa0c4082f618946177843db3138ae69679a54b95cf345ed759450d870aa87bee538000808360306ba0151ccc02146b9b11adf516e6787b59acae3e76544fdcd75e77e67c6b598ce65da064c5dd5aae2fbb535830ebbdad0234975cd7ece3562013b63ea18cc0df6c97d4");
        let tx = LegacyTransaction::decode(&encoded_tx).unwrap();
        let expected_tx = LegacyTransaction {
            nonce: 0,
            gas_price: 1001000000,
            gas_limit: 63000,
            to: TxKind::Call(Address::from_slice(
                &hex!("6177843db3138ae69679a54b95cf345ed759450d"),
            )),
            value: 3000000000000000_u64.into(),
            data: Bytes::new(),
            r: U256::from_str_radix(
                "151ccc02146b9b11adf516e6787b59acae3e76544fdcd75e77e67c6b598ce65d",
                16,
            )
            .unwrap(),
            s: U256::from_str_radix(
                "64c5dd5aae2fbb535830ebbdad0234975cd7ece3562013b63ea18cc0df6c97d4",
                16,
            )
            .unwrap(),
            v: 6303851.into(),
        };
        assert_eq!(tx, expected_tx);
        // Re-encoding is byte-for-byte identical.
        assert_eq!(tx.encode_to_vec(), encoded_tx.to_vec());
    }

    #[test]
    fn eip1559_tx_rlp_decode() {
        let encoded_tx = hex!("f86c8330182480114e82f618946177843db3138ae69679a54b95cf345ed759450d870aa87bee53800080c080a0151ccc02146b9b11adf516e6787b59acae3e76544fdcd75e77e67c6b598ce65da064c5dd5aae2fbb535830ebbdad0234975cd7ece3562013b63ea18cc0df6c97d4");
        let tx = EIP1559Transaction::decode(&encoded_tx).unwrap();
        assert_eq!(tx.chain_id, 3151908);
        assert_eq!(tx.max_priority_fee_per_gas, 17);
        assert_eq!(tx.max_fee_per_gas, 78);
        assert_eq!(tx.gas_limit, 63000);
        assert!(!tx.signature_y_parity);
        assert_eq!(tx.encode_to_vec(), encoded_tx.to_vec());
    }

    #[test]
    fn eip2930_compute_hash() {
        // taken from Hive
        let tx = EIP2930Transaction {
            chain_id: 3503995874084926u64,
            nonce: 7,
            gas_price: 0x2dbf1f9a,
            gas_limit: 0x186A0,
            to: TxKind::Call(hex!("7dcd17433742f4c0ca53122ab541d0ba67fc27df").into()),
            value: 2.into(),
            data: Bytes::from(&b"\xdbS\x06$\x8e\x03\x13\xe7emit"[..]),
            access_list: vec![(
                hex!("7dcd17433742f4c0ca53122ab541d0ba67fc27df").into(),
                vec![
                    hex!("0000000000000000000000000000000000000000000000000000000000000000").into(),
                    hex!("a3d07a7d68fbd49ec2f8e6befdd86c885f86c272819f6f345f365dec35ae6707").into(),
                ],
            )],
            signature_y_parity: false,
            signature_r: U256::from_dec_str(
                "75813812796588349127366022588733264074091236448495248199152066031778895768879",
            )
            .unwrap(),
            signature_s: U256::from_dec_str(
                "25476208226281085290728123165613764315157904411823916642262684106502155457829",
            )
            .unwrap(),
        };
        let tx = Transaction::EIP2930Transaction(tx);

        let expected_hash =
            hex!("a0762610d794acddd2dca15fb7c437ada3611c886f3bea675d53d8da8a6c41b2");
        assert_eq!(tx.compute_hash(), H256::from(expected_hash));
    }

    #[test]
    fn canonical_roundtrip_all_types() {
        let legacy = Transaction::LegacyTransaction(LegacyTransaction {
            nonce: 1,
            gas_price: 10,
            gas_limit: 21_000,
            to: TxKind::Create,
            value: U256::from(5),
            data: Bytes::from_static(b"\x60\x00"),
            v: 27.into(),
            r: U256::one(),
            s: U256::one(),
        });
        let eip1559 = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 1729,
            nonce: 1,
            max_priority_fee_per_gas: 1000,
            max_fee_per_gas: 2000,
            gas_limit: 21000,
            to: TxKind::Call(Address::repeat_byte(0xaa)),
            value: U256::from(100000),
            data: Bytes::new(),
            access_list: vec![(Address::repeat_byte(0xbb), vec![H256::zero()])],
            signature_y_parity: true,
            signature_r: U256::one(),
            signature_s: U256::one(),
        });
        let eip4844 = Transaction::EIP4844Transaction(EIP4844Transaction {
            chain_id: 1,
            nonce: 9,
            max_priority_fee_per_gas: 2,
            max_fee_per_gas: 20,
            gas_limit: 63_000,
            to: Address::repeat_byte(0xcc),
            value: U256::zero(),
            data: Bytes::new(),
            access_list: vec![],
            max_fee_per_blob_gas: U256::from(3),
            blob_versioned_hashes: vec![H256::from_low_u64_be(1)],
            signature_y_parity: false,
            signature_r: U256::one(),
            signature_s: U256::one(),
        });

        for tx in [legacy, eip1559, eip4844] {
            let encoded = tx.encode_canonical_to_vec();
            let decoded = Transaction::decode_canonical(&encoded).unwrap();
            assert_eq!(decoded, tx);
            // Determinism
            assert_eq!(decoded.encode_canonical_to_vec(), encoded);
        }
    }

    #[test]
    fn wrong_type_byte_is_rejected() {
        assert!(matches!(
            Transaction::decode_canonical(&[0x05, 0xc0]),
            Err(RLPDecodeError::WrongTxType(0x05))
        ));
    }

    #[test]
    fn sign_and_recover_eip1559() {
        let secret_key = SecretKey::from_slice(&hex!(
            "4646464646464646464646464646464646464646464646464646464646464646"
        ))
        .unwrap();
        let expected_sender = address_from_secret_key(&secret_key);

        let mut tx = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 100,
            gas_limit: 21_000,
            to: TxKind::Call(Address::repeat_byte(0x11)),
            value: U256::from(1234),
            data: Bytes::new(),
            access_list: vec![],
            ..Default::default()
        });
        tx.sign(&secret_key, None);
        assert_eq!(tx.sender().unwrap(), expected_sender);
    }

    #[test]
    fn sign_and_recover_legacy_eip155() {
        // The EIP-155 example transaction.
        let secret_key = SecretKey::from_slice(&hex!(
            "4646464646464646464646464646464646464646464646464646464646464646"
        ))
        .unwrap();
        let mut tx = LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::from_slice(&hex!(
                "3535353535353535353535353535353535353535"
            ))),
            value: U256::from_dec_str("1000000000000000000").unwrap(),
            data: Bytes::new(),
            ..Default::default()
        };
        tx.sign(&secret_key, Some(1));
        assert_eq!(tx.v, U256::from(37));
        assert_eq!(
            tx.r,
            U256::from_dec_str(
                "18515461264373351373200002665853028612451056578545711640558177340181847433846"
            )
            .unwrap()
        );
        assert_eq!(
            tx.s,
            U256::from_dec_str(
                "46948507304638947509940763649030358759909902576025900602547168820602576006531"
            )
            .unwrap()
        );

        let tx = Transaction::LegacyTransaction(tx);
        assert_eq!(tx.sender().unwrap(), address_from_secret_key(&secret_key));
        assert_eq!(tx.chain_id(), Some(1));
        assert!(tx.protected());
    }

    #[test]
    fn effective_gas_tip() {
        let tx = Transaction::EIP1559Transaction(EIP1559Transaction {
            max_priority_fee_per_gas: 10,
            max_fee_per_gas: 100,
            ..Default::default()
        });
        // Tip capped by the priority fee.
        assert_eq!(tx.effective_gas_tip(Some(50)), Some(10));
        // Tip limited by what remains above the base fee.
        assert_eq!(tx.effective_gas_tip(Some(95)), Some(5));
        // Base fee above the cap: not includable.
        assert_eq!(tx.effective_gas_tip(Some(101)), None);
        // No base fee: the full tip cap.
        assert_eq!(tx.effective_gas_tip(None), Some(10));
    }

    #[test]
    fn validation_rules() {
        let spec = ChainSpec::custom(1, Fork::Cancun);

        let high_s = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 1,
            signature_s: U256::MAX,
            ..Default::default()
        });
        assert_eq!(high_s.validate(&spec), Err(InvalidTransaction::HighS));

        let inverted_fees = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 1,
            max_priority_fee_per_gas: 10,
            max_fee_per_gas: 5,
            ..Default::default()
        });
        assert_eq!(
            inverted_fees.validate(&spec),
            Err(InvalidTransaction::PriorityFeeGreaterThanMaxFee)
        );

        let zero_blobs = Transaction::EIP4844Transaction(EIP4844Transaction {
            chain_id: 1,
            ..Default::default()
        });
        assert_eq!(
            zero_blobs.validate(&spec),
            Err(InvalidTransaction::BlobCountOutOfRange(0))
        );

        let wrong_version = Transaction::EIP4844Transaction(EIP4844Transaction {
            chain_id: 1,
            blob_versioned_hashes: vec![H256::from_low_u64_be(0x02 << 56)],
            ..Default::default()
        });
        assert!(matches!(
            wrong_version.validate(&spec),
            Err(InvalidTransaction::InvalidVersionedHashVersion)
        ));

        let wrong_chain = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 2,
            ..Default::default()
        });
        assert_eq!(
            wrong_chain.validate(&spec),
            Err(InvalidTransaction::ChainIdMismatch {
                expected: 1,
                got: 2
            })
        );

        // Typed transactions are rejected before their activation fork.
        let old_spec = ChainSpec::custom(1, Fork::Istanbul);
        let typed = Transaction::EIP2930Transaction(EIP2930Transaction {
            chain_id: 1,
            ..Default::default()
        });
        assert_eq!(
            typed.validate(&old_spec),
            Err(InvalidTransaction::TypeNotActivated(TxType::EIP2930))
        );
    }

    #[test]
    fn blob_tx_cannot_exceed_block_blob_budget() {
        let spec = ChainSpec::custom(1, Fork::Cancun);
        let hashes = vec![H256::from_low_u64_be(0x01 << 56); 7];
        let too_many = Transaction::EIP4844Transaction(EIP4844Transaction {
            chain_id: 1,
            blob_versioned_hashes: hashes,
            ..Default::default()
        });
        assert_eq!(
            too_many.validate(&spec),
            Err(InvalidTransaction::BlobCountOutOfRange(7))
        );
    }

    #[test]
    fn serialize_transaction_json() {
        let tx = Transaction::EIP1559Transaction(EIP1559Transaction {
            chain_id: 1729,
            nonce: 1,
            max_priority_fee_per_gas: 1000,
            max_fee_per_gas: 2000,
            gas_limit: 21000,
            to: TxKind::Call(Address::from_str("0x000a52D537c4150ec274dcE3962a0d179B7E71B0").unwrap()),
            value: U256::from(100000),
            data: Bytes::from_static(b"\x03"),
            access_list: vec![],
            signature_y_parity: true,
            signature_r: U256::one(),
            signature_s: U256::zero(),
        });
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "0x2");
        assert_eq!(json["nonce"], "0x1");
        assert_eq!(json["maxFeePerGas"], "0x7d0");
        assert_eq!(json["chainId"], "0x6c1");
    }
}
