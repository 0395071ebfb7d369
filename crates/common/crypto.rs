//! Process-wide crypto backends that need explicit setup before use.
//!
//! The KZG trusted setup is large and loaded from disk, so it is installed
//! once by the embedder; constructing or validating anything that needs
//! EIP-4844 proofs before that fails with [`CryptoError::NotInitialized`].

use std::path::Path;
use std::sync::OnceLock;

use c_kzg::KzgSettings;
use thiserror::Error;

static KZG_SETTINGS: OnceLock<KzgSettings> = OnceLock::new();

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto backend not initialized")]
    NotInitialized,
    #[error("crypto backend already initialized")]
    AlreadyInitialized,
    #[error("failed to load KZG trusted setup: {0}")]
    TrustedSetup(String),
    #[error("KZG proof verification failed: {0}")]
    KzgVerification(String),
}

/// Loads the EIP-4844 trusted setup from a `trusted_setup.txt` file.
/// One-shot: a second call fails with `AlreadyInitialized`.
pub fn init_kzg(trusted_setup_path: &Path) -> Result<(), CryptoError> {
    let settings = KzgSettings::load_trusted_setup_file(trusted_setup_path)
        .map_err(|err| CryptoError::TrustedSetup(err.to_string()))?;
    KZG_SETTINGS
        .set(settings)
        .map_err(|_| CryptoError::AlreadyInitialized)
}

pub fn kzg_initialized() -> bool {
    KZG_SETTINGS.get().is_some()
}

pub fn kzg_settings() -> Result<&'static KzgSettings, CryptoError> {
    KZG_SETTINGS.get().ok_or(CryptoError::NotInitialized)
}

/// Batch-verifies blob KZG proofs against their commitments.
pub fn verify_blob_kzg_proof_batch(
    blobs: &[c_kzg::Blob],
    commitments: &[c_kzg::Bytes48],
    proofs: &[c_kzg::Bytes48],
) -> Result<bool, CryptoError> {
    c_kzg::KzgProof::verify_blob_kzg_proof_batch(blobs, commitments, proofs, kzg_settings()?)
        .map_err(|err| CryptoError::KzgVerification(err.to_string()))
}

/// Verifies a single point-evaluation proof (the 0x0a precompile backend).
pub fn verify_kzg_proof(
    commitment: &c_kzg::Bytes48,
    z: &c_kzg::Bytes32,
    y: &c_kzg::Bytes32,
    proof: &c_kzg::Bytes48,
) -> Result<bool, CryptoError> {
    c_kzg::KzgProof::verify_kzg_proof(commitment, z, y, proof, kzg_settings()?)
        .map_err(|err| CryptoError::KzgVerification(err.to_string()))
}
