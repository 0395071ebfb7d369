//! Built-in contracts at the low addresses, with their fork/EIP
//! availability. The active set is a pure function of the config and must be
//! recomputed when the chain spec signals a fork change; custom entries take
//! precedence over the built-in table.

pub mod bls;

use bytes::Bytes;
use ethereum_types::{Address, H160, U256};
use ethrun_core::crypto as core_crypto;
use ethrun_core::types::Fork;
use lambdaworks_math::cyclic_group::IsGroup;
use lambdaworks_math::elliptic_curve::short_weierstrass::curves::bn_254::curve::{
    BN254Curve, BN254FieldElement,
};
use lambdaworks_math::elliptic_curve::traits::IsEllipticCurve;
use lambdaworks_math::traits::ByteConversion;
use libsecp256k1::{Message, RecoveryId, Signature};
use num_bigint::BigUint;
use sha2::Digest;
use std::collections::HashMap;

use crate::environment::{Environment, EvmConfig};
use crate::errors::{InternalError, OutOfGasError, PrecompileError, VMError};

pub const ECRECOVER_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01,
]);
pub const SHA2_256_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x02,
]);
pub const RIPEMD_160_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x03,
]);
pub const IDENTITY_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x04,
]);
pub const MODEXP_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x05,
]);
pub const BN254_ADD_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x06,
]);
pub const BN254_MUL_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x07,
]);
pub const BN254_PAIRING_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x08,
]);
pub const BLAKE2F_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x09,
]);
pub const POINT_EVALUATION_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0a,
]);

pub const ECRECOVER_COST: u64 = 3000;
pub const SHA2_256_STATIC_COST: u64 = 60;
pub const SHA2_256_WORD_COST: u64 = 12;
pub const RIPEMD_160_STATIC_COST: u64 = 600;
pub const RIPEMD_160_WORD_COST: u64 = 120;
pub const IDENTITY_STATIC_COST: u64 = 15;
pub const IDENTITY_WORD_COST: u64 = 3;
pub const MODEXP_MIN_COST: u64 = 200;
pub const BLAKE2F_ROUND_COST: u64 = 1;
pub const POINT_EVALUATION_COST: u64 = 50_000;

/// How a table entry becomes available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    FromFork(Fork),
    Eip(u64),
}

impl Availability {
    pub fn is_active(&self, config: &EvmConfig) -> bool {
        match self {
            Availability::FromFork(fork) => config.gte(*fork),
            Availability::Eip(eip) => config.is_activated(*eip),
        }
    }
}

pub type PrecompileFn = fn(&Bytes, u64, &mut u64, &EvmConfig) -> Result<Bytes, VMError>;

const BUILTIN_TABLE: &[(H160, Availability, PrecompileFn)] = &[
    (ECRECOVER_ADDRESS, Availability::FromFork(Fork::Frontier), ecrecover),
    (SHA2_256_ADDRESS, Availability::FromFork(Fork::Frontier), sha2_256),
    (RIPEMD_160_ADDRESS, Availability::FromFork(Fork::Frontier), ripemd_160),
    (IDENTITY_ADDRESS, Availability::FromFork(Fork::Frontier), identity),
    (MODEXP_ADDRESS, Availability::FromFork(Fork::Byzantium), modexp),
    (BN254_ADD_ADDRESS, Availability::FromFork(Fork::Byzantium), bn254_add),
    (BN254_MUL_ADDRESS, Availability::FromFork(Fork::Byzantium), bn254_mul),
    (BN254_PAIRING_ADDRESS, Availability::FromFork(Fork::Byzantium), bn254_pairing),
    (BLAKE2F_ADDRESS, Availability::FromFork(Fork::Istanbul), blake2f),
    (POINT_EVALUATION_ADDRESS, Availability::Eip(4844), point_evaluation),
    (bls::G1_ADD_ADDRESS, Availability::Eip(2537), bls::g1_add),
    (bls::G1_MUL_ADDRESS, Availability::Eip(2537), bls::g1_mul),
    (bls::G1_MSM_ADDRESS, Availability::Eip(2537), bls::g1_msm),
    (bls::G2_ADD_ADDRESS, Availability::Eip(2537), bls::g2_add),
    (bls::G2_MUL_ADDRESS, Availability::Eip(2537), bls::g2_mul),
    (bls::G2_MSM_ADDRESS, Availability::Eip(2537), bls::g2_msm),
    (bls::PAIRING_ADDRESS, Availability::Eip(2537), bls::pairing),
    (bls::MAP_FP_TO_G1_ADDRESS, Availability::Eip(2537), bls::map_fp_to_g1),
    (bls::MAP_FP2_TO_G2_ADDRESS, Availability::Eip(2537), bls::map_fp2_to_g2),
];

/// The precompiles active under one config, plus custom entries.
#[derive(Clone)]
pub struct PrecompileSet {
    active: HashMap<Address, PrecompileFn>,
}

impl PrecompileSet {
    pub fn new(config: &EvmConfig) -> Self {
        let active = BUILTIN_TABLE
            .iter()
            .filter(|(_, availability, _)| availability.is_active(config))
            .map(|(address, _, function)| (*address, *function))
            .collect();
        Self { active }
    }

    pub fn is_precompile(&self, address: Address) -> bool {
        self.active.contains_key(&address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.active.keys().copied().collect()
    }

    /// Installs a custom precompile, shadowing any built-in at the address.
    pub fn with_custom(mut self, address: Address, function: PrecompileFn) -> Self {
        self.active.insert(address, function);
        self
    }

    /// Removes the entry at the address.
    pub fn without(mut self, address: Address) -> Self {
        self.active.remove(&address);
        self
    }

    pub fn execute(
        &self,
        address: Address,
        calldata: &Bytes,
        gas_limit: u64,
        consumed_gas: &mut u64,
        env: &Environment,
    ) -> Result<Bytes, VMError> {
        let function = self
            .active
            .get(&address)
            .ok_or(VMError::Internal(InternalError::Custom(
                "not a precompile address".to_string(),
            )))?;
        function(calldata, gas_limit, consumed_gas, &env.config)
    }
}

/// Charges the precompile cost against the call allowance.
pub fn increase_precompile_consumed_gas(
    gas_for_call: u64,
    gas_cost: u64,
    consumed_gas: &mut u64,
) -> Result<(), VMError> {
    let next = consumed_gas
        .checked_add(gas_cost)
        .ok_or(PrecompileError::GasConsumedOverflow)?;
    if next > gas_for_call {
        return Err(VMError::Precompile(PrecompileError::NotEnoughGas));
    }
    *consumed_gas = next;
    Ok(())
}

/// Input shorter than expected reads as zero-filled; longer input is
/// truncated.
fn fill_with_zeros(calldata: &Bytes, target_len: usize) -> Vec<u8> {
    let mut padded = calldata.to_vec();
    padded.resize(target_len.max(calldata.len()), 0);
    padded
}

fn word_count(len: usize) -> u64 {
    (len as u64 + 31) / 32
}

fn linear_cost(static_cost: u64, word_cost: u64, len: usize) -> Result<u64, VMError> {
    word_cost
        .checked_mul(word_count(len))
        .and_then(|words| words.checked_add(static_cost))
        .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))
}

/// ECDSA public-key recovery (address 0x01).
pub fn ecrecover(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, ECRECOVER_COST, consumed_gas)?;

    let calldata = fill_with_zeros(calldata, 128);

    let hash = calldata.get(0..32).ok_or(InternalError::SlicingError)?;
    let message = Message::parse_slice(hash).map_err(|_| PrecompileError::ParsingInputError)?;

    let v = U256::from_big_endian(calldata.get(32..64).ok_or(InternalError::SlicingError)?);
    // Only 27 and 28 recover; anything else yields an empty answer.
    if v != U256::from(27) && v != U256::from(28) {
        return Ok(Bytes::new());
    }
    let recovery_id = match RecoveryId::parse_rpc(v.low_u64() as u8) {
        Ok(id) => id,
        Err(_) => return Ok(Bytes::new()),
    };

    let signature_bytes = calldata.get(64..128).ok_or(InternalError::SlicingError)?;
    let signature = match Signature::parse_standard_slice(signature_bytes) {
        Ok(signature) => signature,
        Err(_) => return Ok(Bytes::new()),
    };

    let public_key = match libsecp256k1::recover(&message, &signature, &recovery_id) {
        Ok(key) => key.serialize(),
        Err(_) => return Ok(Bytes::new()),
    };

    let digest: [u8; 32] = sha3::Keccak256::digest(&public_key[1..]).into();
    let mut output = vec![0u8; 12];
    output.extend_from_slice(&digest[12..]);
    Ok(Bytes::from(output))
}

/// SHA2-256 of the input (address 0x02).
pub fn sha2_256(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let cost = linear_cost(SHA2_256_STATIC_COST, SHA2_256_WORD_COST, calldata.len())?;
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;
    let digest: [u8; 32] = sha2::Sha256::digest(calldata).into();
    Ok(Bytes::copy_from_slice(&digest))
}

/// RIPEMD-160 of the input, left-padded to a word (address 0x03).
pub fn ripemd_160(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let cost = linear_cost(RIPEMD_160_STATIC_COST, RIPEMD_160_WORD_COST, calldata.len())?;
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;

    let mut hasher = ripemd::Ripemd160::new();
    hasher.update(calldata);
    let mut output = vec![0u8; 12];
    output.extend_from_slice(&hasher.finalize());
    Ok(Bytes::from(output))
}

/// The identity function (address 0x04).
pub fn identity(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let cost = linear_cost(IDENTITY_STATIC_COST, IDENTITY_WORD_COST, calldata.len())?;
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;
    Ok(calldata.clone())
}

/// Modular exponentiation (address 0x05, EIP-198 with EIP-2565 pricing from
/// Berlin).
pub fn modexp(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let calldata = fill_with_zeros(calldata, 96);

    let base_size = U256::from_big_endian(calldata.get(0..32).ok_or(InternalError::SlicingError)?);
    let exponent_size =
        U256::from_big_endian(calldata.get(32..64).ok_or(InternalError::SlicingError)?);
    let modulus_size =
        U256::from_big_endian(calldata.get(64..96).ok_or(InternalError::SlicingError)?);

    if base_size.is_zero() && modulus_size.is_zero() {
        let floor = if config.is_activated(2565) {
            MODEXP_MIN_COST
        } else {
            0
        };
        increase_precompile_consumed_gas(gas_for_call, floor, consumed_gas)?;
        return Ok(Bytes::new());
    }

    let base_size: usize = base_size
        .try_into()
        .map_err(|_| PrecompileError::ParsingInputError)?;
    let exponent_size: usize = exponent_size
        .try_into()
        .map_err(|_| PrecompileError::ParsingInputError)?;
    let modulus_size: usize = modulus_size
        .try_into()
        .map_err(|_| PrecompileError::ParsingInputError)?;

    let base_end = 96usize
        .checked_add(base_size)
        .ok_or(InternalError::ArithmeticOverflow)?;
    let exponent_end = base_end
        .checked_add(exponent_size)
        .ok_or(InternalError::ArithmeticOverflow)?;

    let base = BigUint::from_bytes_be(calldata.get(96..base_end).unwrap_or_default());
    let exponent_bytes = calldata.get(base_end..exponent_end).unwrap_or_default();
    let exponent = BigUint::from_bytes_be(exponent_bytes);
    let modulus_bytes = {
        let raw = calldata.get(exponent_end..).unwrap_or_default();
        let mut padded = raw.to_vec();
        padded.resize(modulus_size.max(raw.len()), 0);
        padded.get(..modulus_size).unwrap_or_default().to_vec()
    };
    let modulus = BigUint::from_bytes_be(&modulus_bytes);

    let cost = modexp_gas(&exponent, base_size, exponent_size, modulus_size, config)?;
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;

    let result = if modulus == BigUint::ZERO {
        BigUint::ZERO
    } else if exponent == BigUint::ZERO {
        BigUint::from(1u8) % &modulus
    } else {
        base.modpow(&exponent, &modulus)
    };

    let mut output = vec![0u8; modulus_size];
    let bytes = result.to_bytes_be();
    let offset = modulus_size.saturating_sub(bytes.len());
    output
        .get_mut(offset..)
        .ok_or(InternalError::SlicingError)?
        .copy_from_slice(&bytes[bytes.len().saturating_sub(modulus_size)..]);
    Ok(Bytes::from(output))
}

fn modexp_gas(
    exponent: &BigUint,
    base_size: usize,
    exponent_size: usize,
    modulus_size: usize,
    config: &EvmConfig,
) -> Result<u64, VMError> {
    let max_len = base_size.max(modulus_size) as u64;

    // Adjusted exponent length: bit length of the leading 32 bytes.
    let leading_bits = if exponent_size <= 32 {
        exponent.bits().saturating_sub(1)
    } else {
        let leading: BigUint = exponent >> (8 * (exponent_size - 32)) as u64;
        leading.bits().saturating_sub(1)
    };
    let iteration_count = if exponent_size <= 32 {
        leading_bits
    } else {
        (8 * (exponent_size as u64 - 32)) + leading_bits
    }
    .max(1);

    if config.is_activated(2565) {
        let words = (max_len + 7) / 8;
        let multiplication_complexity = words
            .checked_mul(words)
            .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))?;
        let cost = multiplication_complexity
            .checked_mul(iteration_count)
            .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))?
            / 3;
        Ok(cost.max(MODEXP_MIN_COST))
    } else {
        // EIP-198 complexity schedule.
        let complexity = if max_len <= 64 {
            max_len * max_len
        } else if max_len <= 1024 {
            max_len * max_len / 4 + 96 * max_len - 3072
        } else {
            let squared = max_len
                .checked_mul(max_len)
                .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))?;
            squared / 16 + 480 * max_len - 199_680
        };
        complexity
            .checked_mul(iteration_count)
            .map(|cost| cost / 20)
            .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))
    }
}

fn bn254_field_element(bytes: &[u8]) -> Result<BN254FieldElement, VMError> {
    BN254FieldElement::from_bytes_be(bytes)
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))
}

fn bn254_point(
    x: &BN254FieldElement,
    y: &BN254FieldElement,
) -> Result<
    lambdaworks_math::elliptic_curve::short_weierstrass::point::ShortWeierstrassProjectivePoint<
        BN254Curve,
    >,
    VMError,
> {
    BN254Curve::create_point_from_affine(x.clone(), y.clone())
        .map_err(|_| VMError::Precompile(PrecompileError::InvalidPoint))
}

fn bn254_point_bytes(
    point: &lambdaworks_math::elliptic_curve::short_weierstrass::point::ShortWeierstrassProjectivePoint<BN254Curve>,
) -> Vec<u8> {
    if point.is_neutral_element() {
        return vec![0u8; 64];
    }
    let affine = point.to_affine();
    [affine.x().to_bytes_be(), affine.y().to_bytes_be()].concat()
}

/// bn254 point addition (address 0x06), repriced by EIP-1108 at Istanbul.
pub fn bn254_add(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let cost = if config.gte(Fork::Istanbul) { 150 } else { 500 };
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;

    let calldata = fill_with_zeros(calldata, 128);
    let x1 = bn254_field_element(&calldata[0..32])?;
    let y1 = bn254_field_element(&calldata[32..64])?;
    let x2 = bn254_field_element(&calldata[64..96])?;
    let y2 = bn254_field_element(&calldata[96..128])?;

    let zero = BN254FieldElement::from(0);
    let first_is_infinity = x1 == zero && y1 == zero;
    let second_is_infinity = x2 == zero && y2 == zero;

    let result = match (first_is_infinity, second_is_infinity) {
        (true, true) => return Ok(Bytes::from(vec![0u8; 64])),
        (true, false) => bn254_point(&x2, &y2)?,
        (false, true) => bn254_point(&x1, &y1)?,
        (false, false) => {
            let first = bn254_point(&x1, &y1)?;
            let second = bn254_point(&x2, &y2)?;
            first.operate_with(&second)
        }
    };
    Ok(Bytes::from(bn254_point_bytes(&result)))
}

/// bn254 scalar multiplication (address 0x07).
pub fn bn254_mul(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    config: &EvmConfig,
) -> Result<Bytes, VMError> {
    let cost = if config.gte(Fork::Istanbul) { 6000 } else { 40_000 };
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;

    use lambdaworks_math::unsigned_integer::element::U256 as ScalarWord;

    let calldata = fill_with_zeros(calldata, 96);
    let x = bn254_field_element(&calldata[0..32])?;
    let y = bn254_field_element(&calldata[32..64])?;

    let zero = BN254FieldElement::from(0);
    if x == zero && y == zero {
        return Ok(Bytes::from(vec![0u8; 64]));
    }

    let point = bn254_point(&x, &y)?;
    let scalar = ScalarWord::from_bytes_be(&calldata[64..96])
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))?;
    if scalar == ScalarWord::from_u64(0) {
        return Ok(Bytes::from(vec![0u8; 64]));
    }
    let result = point.operate_with_self(scalar);
    Ok(Bytes::from(bn254_point_bytes(&result)))
}

/// bn254 pairing check (address 0x08).
pub fn bn254_pairing(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    config: &EvmConfig,
) -> Result<Bytes, VMError> {
    use lambdaworks_math::elliptic_curve::short_weierstrass::curves::bn_254::{
        field_extension::{Degree12ExtensionField, Degree2ExtensionField},
        pairing::BN254AtePairing,
        twist::BN254TwistCurve,
    };
    use lambdaworks_math::elliptic_curve::traits::IsPairing;
    use lambdaworks_math::field::element::FieldElement;

    if calldata.len() % 192 != 0 {
        return Err(VMError::Precompile(PrecompileError::ParsingInputError));
    }
    let pair_count = (calldata.len() / 192) as u64;
    let cost = if config.gte(Fork::Istanbul) {
        45_000 + 34_000 * pair_count
    } else {
        100_000 + 80_000 * pair_count
    };
    increase_precompile_consumed_gas(gas_for_call, cost, consumed_gas)?;

    let mut pairs = Vec::with_capacity(pair_count as usize);
    for chunk in calldata.chunks_exact(192) {
        let x = bn254_field_element(&chunk[0..32])?;
        let y = bn254_field_element(&chunk[32..64])?;
        // G2 coordinates come imaginary-part first on the wire.
        let x_c1 = bn254_field_element(&chunk[64..96])?;
        let x_c0 = bn254_field_element(&chunk[96..128])?;
        let y_c1 = bn254_field_element(&chunk[128..160])?;
        let y_c0 = bn254_field_element(&chunk[160..192])?;

        let zero = BN254FieldElement::from(0);
        let g1_is_infinity = x == zero && y == zero;
        let g2_is_infinity = x_c0 == zero && x_c1 == zero && y_c0 == zero && y_c1 == zero;
        if g1_is_infinity || g2_is_infinity {
            // A pair with the point at infinity contributes the identity.
            continue;
        }

        let g1 = bn254_point(&x, &y)?;
        let g2_x = FieldElement::<Degree2ExtensionField>::new([x_c0, x_c1]);
        let g2_y = FieldElement::<Degree2ExtensionField>::new([y_c0, y_c1]);
        let g2 = BN254TwistCurve::create_point_from_affine(g2_x, g2_y)
            .map_err(|_| VMError::Precompile(PrecompileError::InvalidPoint))?;
        pairs.push((g1, g2));
    }

    let paired_one = if pairs.is_empty() {
        true
    } else {
        let refs: Vec<_> = pairs.iter().map(|(g1, g2)| (g1, g2)).collect();
        let result = BN254AtePairing::compute_batch(&refs)
            .map_err(|_| VMError::Precompile(PrecompileError::InvalidPoint))?;
        result == FieldElement::<Degree12ExtensionField>::one()
    };

    let mut output = [0u8; 32];
    if paired_one {
        output[31] = 1;
    }
    Ok(Bytes::copy_from_slice(&output))
}

/// BLAKE2b compression function F (address 0x09, EIP-152).
pub fn blake2f(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    if calldata.len() != 213 {
        return Err(VMError::Precompile(PrecompileError::ParsingInputError));
    }
    let rounds = u32::from_be_bytes(
        calldata[0..4]
            .try_into()
            .map_err(|_| InternalError::ConversionError)?,
    );
    increase_precompile_consumed_gas(
        gas_for_call,
        BLAKE2F_ROUND_COST * rounds as u64,
        consumed_gas,
    )?;

    let mut h = [0u64; 8];
    for (i, chunk) in calldata[4..68].chunks_exact(8).enumerate() {
        h[i] = u64::from_le_bytes(chunk.try_into().map_err(|_| InternalError::ConversionError)?);
    }
    let mut m = [0u64; 16];
    for (i, chunk) in calldata[68..196].chunks_exact(8).enumerate() {
        m[i] = u64::from_le_bytes(chunk.try_into().map_err(|_| InternalError::ConversionError)?);
    }
    let t0 = u64::from_le_bytes(
        calldata[196..204]
            .try_into()
            .map_err(|_| InternalError::ConversionError)?,
    );
    let t1 = u64::from_le_bytes(
        calldata[204..212]
            .try_into()
            .map_err(|_| InternalError::ConversionError)?,
    );
    let final_flag = match calldata[212] {
        0 => false,
        1 => true,
        _ => return Err(VMError::Precompile(PrecompileError::ParsingInputError)),
    };

    blake2b_f(rounds, &mut h, &m, t0, t1, final_flag);

    let mut output = Vec::with_capacity(64);
    for word in h {
        output.extend_from_slice(&word.to_le_bytes());
    }
    Ok(Bytes::from(output))
}

const BLAKE2B_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

fn blake2b_f(rounds: u32, h: &mut [u64; 8], m: &[u64; 16], t0: u64, t1: u64, last: bool) {
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&BLAKE2B_IV);
    v[12] ^= t0;
    v[13] ^= t1;
    if last {
        v[14] = !v[14];
    }

    fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
        v[d] = (v[d] ^ v[a]).rotate_right(32);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(24);
        v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
        v[d] = (v[d] ^ v[a]).rotate_right(16);
        v[c] = v[c].wrapping_add(v[d]);
        v[b] = (v[b] ^ v[c]).rotate_right(63);
    }

    for round in 0..rounds as usize {
        let s = &SIGMA[round % 10];
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// KZG point-evaluation (address 0x0a, EIP-4844). Requires the KZG backend
/// to have been initialized.
pub fn point_evaluation(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, POINT_EVALUATION_COST, consumed_gas)?;

    if calldata.len() != 192 {
        return Err(VMError::Precompile(PrecompileError::ParsingInputError));
    }
    let versioned_hash = &calldata[0..32];
    let z: [u8; 32] = calldata[32..64]
        .try_into()
        .map_err(|_| InternalError::ConversionError)?;
    let y: [u8; 32] = calldata[64..96]
        .try_into()
        .map_err(|_| InternalError::ConversionError)?;
    let commitment: [u8; 48] = calldata[96..144]
        .try_into()
        .map_err(|_| InternalError::ConversionError)?;
    let proof: [u8; 48] = calldata[144..192]
        .try_into()
        .map_err(|_| InternalError::ConversionError)?;

    // The declared hash must commit to the commitment.
    let mut expected: [u8; 32] = sha2::Sha256::digest(commitment).into();
    expected[0] = crate::constants::VERSIONED_HASH_VERSION_KZG;
    if versioned_hash != expected {
        return Err(VMError::Precompile(PrecompileError::InvalidKzgProof));
    }

    if !core_crypto::kzg_initialized() {
        return Err(VMError::Precompile(PrecompileError::CryptoNotInitialized));
    }
    let commitment = c_kzg::Bytes48::from_bytes(&commitment)
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))?;
    let z = c_kzg::Bytes32::from_bytes(&z)
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))?;
    let y = c_kzg::Bytes32::from_bytes(&y)
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))?;
    let proof = c_kzg::Bytes48::from_bytes(&proof)
        .map_err(|_| VMError::Precompile(PrecompileError::ParsingInputError))?;
    let valid = core_crypto::verify_kzg_proof(&commitment, &z, &y, &proof)
        .map_err(|_| VMError::Precompile(PrecompileError::InvalidKzgProof))?;
    if !valid {
        return Err(VMError::Precompile(PrecompileError::InvalidKzgProof));
    }

    // FIELD_ELEMENTS_PER_BLOB || BLS_MODULUS, both 32-byte big-endian.
    let mut output = [0u8; 64];
    U256::from(4096).to_big_endian(&mut output[..32]);
    let modulus = hex::decode("73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001")
        .map_err(|_| InternalError::ConversionError)?;
    output[32..].copy_from_slice(&modulus);
    Ok(Bytes::copy_from_slice(&output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn run(
        function: PrecompileFn,
        input: &[u8],
        gas: u64,
    ) -> (Result<Bytes, VMError>, u64) {
        let mut consumed = 0;
        let result = function(
            &Bytes::copy_from_slice(input),
            gas,
            &mut consumed,
            &EvmConfig::default(),
        );
        (result, consumed)
    }

    #[test]
    fn identity_roundtrip() {
        let (result, consumed) = run(identity, b"hello world", 1000);
        assert_eq!(result.unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(consumed, IDENTITY_STATIC_COST + IDENTITY_WORD_COST);
    }

    #[test]
    fn sha2_known_answer() {
        let (result, _) = run(sha2_256, b"abc", 1000);
        assert_eq!(
            result.unwrap().as_ref(),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn ripemd_known_answer() {
        let (result, _) = run(ripemd_160, b"abc", 10_000);
        assert_eq!(
            result.unwrap().as_ref(),
            hex!("0000000000000000000000008eb208f7e05d987a9b044a8e98c6b087f15a0bfc")
        );
    }

    #[test]
    fn out_of_gas_is_reported() {
        let (result, _) = run(sha2_256, b"abc", 10);
        assert!(matches!(
            result,
            Err(VMError::Precompile(PrecompileError::NotEnoughGas))
        ));
    }

    #[test]
    fn ecrecover_recovers_known_signer() {
        // From the Yellow Paper appendix F example vector set.
        let input = hex!(
            "456e9aea5e197a1f1af7a3e85a3212fa4049a3ba34c2289b4c860fc0b0c64ef3"
            "000000000000000000000000000000000000000000000000000000000000001c"
            "9242685bf161793cc25603c231bc2f568eb630ea16aa137d2664ac8038825608"
            "4f8ae3bd7535248d0bd448298cc2e2071e56992d0774dc340c368ae950852ada"
        );
        let (result, consumed) = run(ecrecover, &input, 5000);
        assert_eq!(consumed, ECRECOVER_COST);
        assert_eq!(
            result.unwrap().as_ref(),
            hex!("0000000000000000000000007156526fbd7a3c72969b54f64e42c10fbb768c8a")
        );
    }

    #[test]
    fn ecrecover_invalid_v_yields_empty() {
        let mut input = [0u8; 128];
        input[63] = 29;
        let (result, _) = run(ecrecover, &input, 5000);
        assert_eq!(result.unwrap(), Bytes::new());
    }

    #[test]
    fn modexp_simple() {
        // 3 ** 2 % 5 = 4
        let mut input = Vec::new();
        input.extend_from_slice(&[0u8; 31]);
        input.push(1); // base len
        input.extend_from_slice(&[0u8; 31]);
        input.push(1); // exp len
        input.extend_from_slice(&[0u8; 31]);
        input.push(1); // mod len
        input.extend_from_slice(&[3, 2, 5]);
        let (result, consumed) = run(modexp, &input, 10_000);
        assert_eq!(result.unwrap().as_ref(), &[4u8]);
        assert_eq!(consumed, MODEXP_MIN_COST);
    }

    #[test]
    fn modexp_zero_modulus() {
        let mut input = Vec::new();
        input.extend_from_slice(&[0u8; 31]);
        input.push(1);
        input.extend_from_slice(&[0u8; 31]);
        input.push(1);
        input.extend_from_slice(&[0u8; 31]);
        input.push(1);
        input.extend_from_slice(&[3, 2, 0]);
        let (result, _) = run(modexp, &input, 10_000);
        assert_eq!(result.unwrap().as_ref(), &[0u8]);
    }

    #[test]
    fn bn254_add_identity() {
        // P + 0 = P for the generator (1, 2).
        let mut input = [0u8; 128];
        input[31] = 1;
        input[63] = 2;
        let (result, _) = run(bn254_add, &input, 1000);
        let output = result.unwrap();
        assert_eq!(output[31], 1);
        assert_eq!(output[63], 2);
    }

    #[test]
    fn bn254_mul_by_zero_scalar() {
        let mut input = [0u8; 96];
        input[31] = 1;
        input[63] = 2;
        let (result, _) = run(bn254_mul, &input, 10_000);
        assert_eq!(result.unwrap(), Bytes::from(vec![0u8; 64]));
    }

    #[test]
    fn bn254_pairing_empty_input_is_one() {
        let (result, consumed) = run(bn254_pairing, &[], 50_000);
        let output = result.unwrap();
        assert_eq!(output[31], 1);
        assert_eq!(consumed, 45_000);
    }

    #[test]
    fn blake2f_eip152_vector() {
        // Test vector 5 from EIP-152.
        let input = hex!(
            "0000000c"
            "48c9bdf267e6096a3ba7ca8485ae67bb2bf894fe72f36e3cf1361d5f3af54fa5"
            "d182e6ad7f520e511f6c3e2b8c68059b6bbd41fbabd9831f79217e1319cde05b"
            "6162630000000000000000000000000000000000000000000000000000000000"
            "0000000000000000000000000000000000000000000000000000000000000000"
            "0000000000000000000000000000000000000000000000000000000000000000"
            "0000000000000000000000000000000000000000000000000000000000000000"
            "0300000000000000"
            "0000000000000000"
            "01"
        );
        let (result, consumed) = run(blake2f, &input, 100);
        assert_eq!(consumed, 12);
        assert_eq!(
            result.unwrap().as_ref(),
            hex!(
                "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d1"
                "7d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"
            )
        );
    }

    #[test]
    fn blake2f_rejects_bad_length() {
        let (result, _) = run(blake2f, &[0u8; 212], 100);
        assert!(result.is_err());
    }

    #[test]
    fn point_evaluation_requires_initialized_backend() {
        let mut input = [0u8; 192];
        let commitment = [0u8; 48];
        let mut hash: [u8; 32] = sha2::Sha256::digest(commitment).into();
        hash[0] = 0x01;
        input[..32].copy_from_slice(&hash);
        let (result, _) = run(point_evaluation, &input, 100_000);
        assert!(matches!(
            result,
            Err(VMError::Precompile(PrecompileError::CryptoNotInitialized))
        ));
    }

    #[test]
    fn active_set_follows_forks() {
        let frontier = PrecompileSet::new(&EvmConfig::new_for_fork(Fork::Frontier));
        assert!(frontier.is_precompile(ECRECOVER_ADDRESS));
        assert!(!frontier.is_precompile(MODEXP_ADDRESS));

        let byzantium = PrecompileSet::new(&EvmConfig::new_for_fork(Fork::Byzantium));
        assert!(byzantium.is_precompile(MODEXP_ADDRESS));
        assert!(byzantium.is_precompile(BN254_PAIRING_ADDRESS));
        assert!(!byzantium.is_precompile(BLAKE2F_ADDRESS));

        let cancun = PrecompileSet::new(&EvmConfig::new_for_fork(Fork::Cancun));
        assert!(cancun.is_precompile(POINT_EVALUATION_ADDRESS));
        // EIP-2537 is not part of any scheduled fork here.
        assert!(!cancun.is_precompile(bls::G1_ADD_ADDRESS));

        let mut spec = ethrun_core::chain_spec::ChainSpec::custom(1, Fork::Cancun);
        spec.set_eips(vec![2537]).unwrap();
        let with_bls = PrecompileSet::new(&EvmConfig::new(&spec));
        assert!(with_bls.is_precompile(bls::G1_ADD_ADDRESS));
        assert!(with_bls.is_precompile(bls::MAP_FP2_TO_G2_ADDRESS));
    }

    #[test]
    fn custom_precompiles_take_precedence() {
        fn echo(
            calldata: &Bytes,
            _gas: u64,
            _consumed: &mut u64,
            _config: &EvmConfig,
        ) -> Result<Bytes, VMError> {
            Ok(calldata.clone())
        }

        let set = PrecompileSet::new(&EvmConfig::default())
            .with_custom(SHA2_256_ADDRESS, echo)
            .without(RIPEMD_160_ADDRESS);
        assert!(set.is_precompile(SHA2_256_ADDRESS));
        assert!(!set.is_precompile(RIPEMD_160_ADDRESS));

        let mut consumed = 0;
        let env = Environment::default_from_address(Address::zero());
        let out = set
            .execute(
                SHA2_256_ADDRESS,
                &Bytes::from_static(b"ping"),
                100,
                &mut consumed,
                &env,
            )
            .unwrap();
        assert_eq!(out, Bytes::from_static(b"ping"));
    }
}
