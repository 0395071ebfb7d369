//! Ordered Merkle-Patricia trie roots for transactions, receipts and
//! withdrawals. The full state trie lives behind the storage layer; only the
//! index-keyed roots that go into block headers are computed here.

use ethereum_types::H256;
use hash256_std_hasher::Hash256StdHasher;
use hash_db::Hasher;
use sha3::{Digest, Keccak256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeccakHasher;

impl Hasher for KeccakHasher {
    type Out = H256;
    type StdHasher = Hash256StdHasher;
    const LENGTH: usize = 32;

    fn hash(data: &[u8]) -> Self::Out {
        H256::from_slice(Keccak256::digest(data).as_slice())
    }
}

/// Root of a trie keyed by `rlp(index)` with the given encoded values.
pub fn ordered_trie_root<I>(items: I) -> H256
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    triehash::ordered_trie_root::<KeccakHasher, I>(items)
}

/// Root of a secure trie: keys are keccak-hashed before insertion, as the
/// account and storage tries do.
pub fn secure_trie_root<I, K, V>(items: I) -> H256
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    triehash::sec_trie_root::<KeccakHasher, _, _, _>(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn empty_trie_root() {
        // keccak256(rlp(""))
        let expected = H256::from_slice(&hex!(
            "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
        ));
        assert_eq!(ordered_trie_root(Vec::<Vec<u8>>::new()), expected);
    }
}
