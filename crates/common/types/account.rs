use std::collections::HashMap;

use bytes::Bytes;
use ethereum_types::{H256, U256};

use ethrun_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::trie::secure_trie_root;
use lazy_static::lazy_static;

lazy_static! {
    /// Keccak256(""), the code hash of an account without code.
    pub static ref EMPTY_CODE_HASH: H256 = H256::from_slice(
        &hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470").unwrap()
    );
    /// Keccak256(rlp("")), the root of an empty trie.
    pub static ref EMPTY_TRIE_HASH: H256 = H256::from_slice(
        &hex::decode("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421").unwrap()
    );
}

/// An account with its code and storage materialized.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Account {
    pub info: AccountInfo,
    pub code: Bytes,
    pub storage: HashMap<H256, U256>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccountInfo {
    pub code_hash: H256,
    pub balance: U256,
    pub nonce: u64,
}

/// The account shape stored in the state trie.
#[derive(Debug, PartialEq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self {
            code_hash: *EMPTY_CODE_HASH,
            balance: Default::default(),
            nonce: Default::default(),
        }
    }
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            nonce: Default::default(),
            balance: Default::default(),
            storage_root: *EMPTY_TRIE_HASH,
            code_hash: *EMPTY_CODE_HASH,
        }
    }
}

impl AccountInfo {
    /// "Empty" in the EIP-161 sense.
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.code_hash == *EMPTY_CODE_HASH
    }

    pub fn has_code(&self) -> bool {
        self.code_hash != *EMPTY_CODE_HASH
    }
}

impl Account {
    pub fn new(balance: U256, code: Bytes, nonce: u64, storage: HashMap<H256, U256>) -> Self {
        Self {
            info: AccountInfo {
                code_hash: code_hash(&code),
                balance,
                nonce,
            },
            code,
            storage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.info.balance = balance;
        self
    }

    pub fn with_code(mut self, code: Bytes) -> Self {
        self.info.code_hash = code_hash(&code);
        self.code = code;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.info.nonce = nonce;
        self
    }

    pub fn with_storage(mut self, storage: HashMap<H256, U256>) -> Self {
        self.storage = storage;
        self
    }
}

pub fn code_hash(code: &Bytes) -> H256 {
    keccak_hash::keccak(code.as_ref())
}

pub fn compute_storage_root(storage: &HashMap<H256, U256>) -> H256 {
    let items = storage
        .iter()
        .filter(|(_, value)| !value.is_zero())
        .map(|(key, value)| (key.as_bytes().to_vec(), value.encode_to_vec()));
    secure_trie_root(items)
}

impl From<&Account> for AccountState {
    fn from(account: &Account) -> Self {
        AccountState {
            nonce: account.info.nonce,
            balance: account.info.balance,
            storage_root: compute_storage_root(&account.storage),
            code_hash: account.info.code_hash,
        }
    }
}

impl RLPEncode for AccountState {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for AccountState {
    fn decode_unfinished(rlp: &[u8]) -> Result<(AccountState, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (storage_root, decoder) = decoder.decode_field("storage_root")?;
        let (code_hash, decoder) = decoder.decode_field("code_hash")?;
        let state = AccountState {
            nonce,
            balance,
            storage_root,
            code_hash,
        };
        Ok((state, decoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_hash() {
        assert_eq!(code_hash(&Bytes::new()), *EMPTY_CODE_HASH);
    }

    #[test]
    fn emptiness_follows_eip161() {
        let account = Account::default();
        assert!(account.is_empty());

        let with_balance = Account::default().with_balance(U256::one());
        assert!(!with_balance.is_empty());

        let with_code = Account::default().with_code(Bytes::from_static(b"\x60\x00"));
        assert!(!with_code.is_empty());
    }

    #[test]
    fn empty_storage_root() {
        assert_eq!(compute_storage_root(&HashMap::new()), *EMPTY_TRIE_HASH);
    }
}
