use ethereum_types::H256;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use ethrun_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::crypto::{self, CryptoError};
use crate::serde_utils;

use super::{EIP4844Transaction, TxType, BYTES_PER_BLOB, VERSIONED_HASH_VERSION_KZG};

pub type Bytes48 = [u8; 48];
pub type Blob = [u8; BYTES_PER_BLOB];
pub type Commitment = Bytes48;
pub type Proof = Bytes48;

/// The sidecar of one or more blob transactions: blobs with their KZG
/// commitments and proofs, index-aligned.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundle {
    #[serde(with = "serde_utils::blob::vec")]
    pub blobs: Vec<Blob>,
    #[serde(with = "serde_utils::bytes48::vec")]
    pub commitments: Vec<Commitment>,
    #[serde(with = "serde_utils::bytes48::vec")]
    pub proofs: Vec<Proof>,
}

#[derive(Debug, Error)]
pub enum BlobsBundleError {
    #[error("blob, commitment, proof and versioned-hash counts differ or are zero")]
    LengthMismatch,
    #[error("commitment does not hash to the declared versioned hash")]
    VersionedHashMismatch,
    #[error("blob KZG proof verification failed")]
    InvalidProof,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// `sha256(commitment)` with the first byte replaced by the KZG version.
pub fn compute_versioned_hash(commitment: &Commitment, version: u8) -> H256 {
    let mut hash: [u8; 32] = Sha256::digest(commitment).into();
    hash[0] = version;
    H256::from(hash)
}

impl BlobsBundle {
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn extend(&mut self, other: &BlobsBundle) {
        self.blobs.extend_from_slice(&other.blobs);
        self.commitments.extend_from_slice(&other.commitments);
        self.proofs.extend_from_slice(&other.proofs);
    }

    /// Validates the sidecar against the transaction it wraps:
    /// index-aligned non-empty lengths, versioned-hash recomputation and the
    /// batch KZG proof. Requires the KZG backend to be initialized.
    pub fn validate(&self, tx: &EIP4844Transaction) -> Result<(), BlobsBundleError> {
        let count = self.blobs.len();
        if count == 0
            || self.commitments.len() != count
            || self.proofs.len() != count
            || tx.blob_versioned_hashes.len() != count
        {
            return Err(BlobsBundleError::LengthMismatch);
        }

        for (commitment, declared) in self.commitments.iter().zip(&tx.blob_versioned_hashes) {
            if compute_versioned_hash(commitment, VERSIONED_HASH_VERSION_KZG) != *declared {
                return Err(BlobsBundleError::VersionedHashMismatch);
            }
        }

        let conversion =
            |err: c_kzg::Error| BlobsBundleError::Crypto(CryptoError::KzgVerification(format!("{err:?}")));
        let blobs = self
            .blobs
            .iter()
            .map(|blob| c_kzg::Blob::from_bytes(blob.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(conversion)?;
        let commitments = self
            .commitments
            .iter()
            .map(|commitment| c_kzg::Bytes48::from_bytes(commitment))
            .collect::<Result<Vec<_>, _>>()
            .map_err(conversion)?;
        let proofs = self
            .proofs
            .iter()
            .map(|proof| c_kzg::Bytes48::from_bytes(proof))
            .collect::<Result<Vec<_>, _>>()
            .map_err(conversion)?;
        if !crypto::verify_blob_kzg_proof_batch(&blobs, &commitments, &proofs)? {
            return Err(BlobsBundleError::InvalidProof);
        }
        Ok(())
    }
}

impl RLPEncode for BlobsBundle {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.blobs)
            .encode_field(&self.commitments)
            .encode_field(&self.proofs)
            .finish();
    }
}

impl RLPDecode for BlobsBundle {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (blobs, decoder) = decoder.decode_field("blobs")?;
        let (commitments, decoder) = decoder.decode_field("commitments")?;
        let (proofs, decoder) = decoder.decode_field("proofs")?;
        Ok((
            Self {
                blobs,
                commitments,
                proofs,
            },
            decoder.finish()?,
        ))
    }
}

/// The devp2p wire shape of a blob transaction:
/// `0x03 || rlp([tx_payload, blobs, commitments, proofs])`.
/// The sidecar travels on the wire but is stripped before block inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedEIP4844Transaction {
    pub tx: EIP4844Transaction,
    pub blobs_bundle: BlobsBundle,
}

impl WrappedEIP4844Transaction {
    pub fn encode_canonical_to_vec(&self) -> Vec<u8> {
        let mut buf = vec![TxType::EIP4844 as u8];
        Encoder::new(&mut buf)
            .encode_field(&self.tx)
            .encode_field(&self.blobs_bundle.blobs)
            .encode_field(&self.blobs_bundle.commitments)
            .encode_field(&self.blobs_bundle.proofs)
            .finish();
        buf
    }

    pub fn decode_canonical(bytes: &[u8]) -> Result<Self, RLPDecodeError> {
        match bytes.first() {
            Some(&byte) if byte == TxType::EIP4844 as u8 => {}
            Some(&byte) => return Err(RLPDecodeError::WrongTxType(byte)),
            None => return Err(RLPDecodeError::InvalidLength),
        }
        let decoder = Decoder::new(&bytes[1..])?;
        let (tx, decoder) = decoder.decode_field("tx")?;
        let (blobs, decoder) = decoder.decode_field("blobs")?;
        let (commitments, decoder) = decoder.decode_field("commitments")?;
        let (proofs, decoder) = decoder.decode_field("proofs")?;
        decoder.finish()?;
        Ok(Self {
            tx,
            blobs_bundle: BlobsBundle {
                blobs,
                commitments,
                proofs,
            },
        })
    }

    /// Full admission check for a wrapped transaction arriving off the wire.
    pub fn validate(&self) -> Result<(), BlobsBundleError> {
        self.blobs_bundle.validate(&self.tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{Address, U256};

    fn sample_tx(hashes: Vec<H256>) -> EIP4844Transaction {
        EIP4844Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 10,
            gas_limit: 21_000,
            to: Address::repeat_byte(0xee),
            value: U256::zero(),
            blob_versioned_hashes: hashes,
            ..Default::default()
        }
    }

    #[test]
    fn versioned_hash_has_version_prefix() {
        let commitment = [7u8; 48];
        let hash = compute_versioned_hash(&commitment, VERSIONED_HASH_VERSION_KZG);
        assert_eq!(hash[0], VERSIONED_HASH_VERSION_KZG);
        let tail: [u8; 32] = Sha256::digest(commitment).into();
        assert_eq!(&hash.as_bytes()[1..], &tail[1..]);
    }

    #[test]
    fn wrapper_roundtrip() {
        let commitment = [1u8; 48];
        let wrapped = WrappedEIP4844Transaction {
            tx: sample_tx(vec![compute_versioned_hash(
                &commitment,
                VERSIONED_HASH_VERSION_KZG,
            )]),
            blobs_bundle: BlobsBundle {
                blobs: vec![[0u8; BYTES_PER_BLOB]],
                commitments: vec![commitment],
                proofs: vec![[2u8; 48]],
            },
        };
        let encoded = wrapped.encode_canonical_to_vec();
        assert_eq!(encoded[0], 0x03);
        let decoded = WrappedEIP4844Transaction::decode_canonical(&encoded).unwrap();
        assert_eq!(decoded, wrapped);
    }

    #[test]
    fn wrapper_rejects_other_types() {
        assert!(matches!(
            WrappedEIP4844Transaction::decode_canonical(&[0x02, 0xc0]),
            Err(RLPDecodeError::WrongTxType(0x02))
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let bundle = BlobsBundle {
            blobs: vec![[0u8; BYTES_PER_BLOB]],
            commitments: vec![],
            proofs: vec![],
        };
        let tx = sample_tx(vec![H256::zero()]);
        assert!(matches!(
            bundle.validate(&tx),
            Err(BlobsBundleError::LengthMismatch)
        ));
    }

    #[test]
    fn mismatched_versioned_hash_is_rejected() {
        let commitment = [1u8; 48];
        let bundle = BlobsBundle {
            blobs: vec![[0u8; BYTES_PER_BLOB]],
            commitments: vec![commitment],
            proofs: vec![[2u8; 48]],
        };
        // Declared hash does not match the commitment.
        let tx = sample_tx(vec![H256::repeat_byte(0x01)]);
        assert!(matches!(
            bundle.validate(&tx),
            Err(BlobsBundleError::VersionedHashMismatch)
        ));
    }
}
