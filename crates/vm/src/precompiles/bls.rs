//! BLS12-381 precompiles (EIP-2537), addresses 0x0c..0x14.
//!
//! Field elements travel as 64-byte big-endian values (16 bytes of zero
//! padding before the 48-byte element); G1 points are 128 bytes, G2 points
//! 256 bytes, the point at infinity is all zeros.

use bls12_381::hash_to_curve::MapToCurve;
use bls12_381::{
    multi_miller_loop, Fp, Fp2, G1Affine, G1Projective, G2Affine, G2Prepared, G2Projective, Gt,
    Scalar,
};
use bytes::Bytes;
use ethereum_types::H160;

use crate::environment::EvmConfig;
use crate::errors::{PrecompileError, VMError};
use crate::precompiles::increase_precompile_consumed_gas;

pub const G1_ADD_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0c,
]);
pub const G1_MUL_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0d,
]);
pub const G1_MSM_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0e,
]);
pub const G2_ADD_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x0f,
]);
pub const G2_MUL_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x10,
]);
pub const G2_MSM_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x11,
]);
pub const PAIRING_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x12,
]);
pub const MAP_FP_TO_G1_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x13,
]);
pub const MAP_FP2_TO_G2_ADDRESS: H160 = H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x14,
]);

pub const G1_ADD_COST: u64 = 500;
pub const G1_MUL_COST: u64 = 12_000;
pub const G2_ADD_COST: u64 = 800;
pub const G2_MUL_COST: u64 = 45_000;
pub const PAIRING_BASE_COST: u64 = 65_000;
pub const PAIRING_PER_PAIR_COST: u64 = 43_000;
pub const MAP_FP_TO_G1_COST: u64 = 5500;
pub const MAP_FP2_TO_G2_COST: u64 = 75_000;

const FP_PADDED_LEN: usize = 64;
const G1_POINT_LEN: usize = 128;
const G1_MUL_INPUT_LEN: usize = 160;
const G2_POINT_LEN: usize = 256;
const G2_MUL_INPUT_LEN: usize = 288;
const PAIRING_PAIR_LEN: usize = 384;

/// Multi-scalar-multiplication discount per EIP-2537, in 1/1000ths of the
/// per-term multiplication cost, indexed by term count (capped at 128).
const MSM_DISCOUNT: [u64; 128] = [
    1200, 888, 764, 641, 594, 547, 500, 453, 438, 423, 408, 394, 379, 364, 349, 334, 330, 326,
    322, 318, 314, 310, 306, 302, 298, 294, 289, 285, 281, 277, 273, 269, 268, 266, 265, 263, 262,
    260, 259, 257, 256, 254, 253, 251, 250, 248, 247, 245, 244, 242, 241, 239, 238, 236, 235, 233,
    232, 231, 229, 228, 226, 225, 223, 222, 221, 220, 219, 219, 218, 217, 216, 216, 215, 214, 213,
    213, 212, 211, 211, 210, 209, 208, 208, 207, 206, 205, 205, 204, 203, 202, 202, 201, 200, 199,
    199, 198, 197, 196, 196, 195, 194, 193, 193, 192, 191, 191, 190, 189, 188, 188, 187, 186, 185,
    185, 184, 183, 182, 182, 181, 180, 179, 179, 178, 177, 176, 176, 175, 174,
];

fn msm_cost(pair_count: usize, per_mul: u64) -> u64 {
    if pair_count == 0 {
        return 0;
    }
    let discount = MSM_DISCOUNT[pair_count.min(MSM_DISCOUNT.len()) - 1];
    pair_count as u64 * per_mul * discount / 1000
}

fn parsing_error() -> VMError {
    VMError::Precompile(PrecompileError::ParsingInputError)
}

/// One padded field element: 16 zero bytes then the canonical big-endian Fp.
fn decode_fp(bytes: &[u8]) -> Result<Fp, VMError> {
    if bytes.len() != FP_PADDED_LEN || bytes[..16].iter().any(|&byte| byte != 0) {
        return Err(parsing_error());
    }
    let element: [u8; 48] = bytes[16..].try_into().map_err(|_| parsing_error())?;
    Option::<Fp>::from(Fp::from_bytes(&element)).ok_or_else(parsing_error)
}

fn encode_fp(element: &Fp) -> [u8; FP_PADDED_LEN] {
    let mut out = [0u8; FP_PADDED_LEN];
    out[16..].copy_from_slice(&element.to_bytes());
    out
}

fn decode_g1(bytes: &[u8], subgroup_check: bool) -> Result<G1Projective, VMError> {
    if bytes.len() != G1_POINT_LEN {
        return Err(parsing_error());
    }
    if bytes.iter().all(|&byte| byte == 0) {
        return Ok(G1Projective::identity());
    }
    let x = decode_fp(&bytes[..64])?;
    let y = decode_fp(&bytes[64..])?;

    let mut uncompressed = [0u8; 96];
    uncompressed[..48].copy_from_slice(&x.to_bytes());
    uncompressed[48..].copy_from_slice(&y.to_bytes());
    let point = Option::<G1Affine>::from(G1Affine::from_uncompressed_unchecked(&uncompressed))
        .ok_or_else(parsing_error)?;
    if !bool::from(point.is_on_curve()) {
        return Err(VMError::Precompile(PrecompileError::InvalidPoint));
    }
    if subgroup_check && !bool::from(point.is_torsion_free()) {
        return Err(VMError::Precompile(PrecompileError::InvalidSubgroupPoint));
    }
    Ok(G1Projective::from(&point))
}

fn encode_g1(point: &G1Projective) -> [u8; G1_POINT_LEN] {
    let affine = G1Affine::from(point);
    let mut out = [0u8; G1_POINT_LEN];
    if bool::from(affine.is_identity()) {
        return out;
    }
    let uncompressed = affine.to_uncompressed();
    out[..64].copy_from_slice(&encode_fp_bytes(&uncompressed[..48]));
    out[64..].copy_from_slice(&encode_fp_bytes(&uncompressed[48..]));
    out
}

fn encode_fp_bytes(element: &[u8]) -> [u8; FP_PADDED_LEN] {
    let mut out = [0u8; FP_PADDED_LEN];
    out[16..].copy_from_slice(element);
    out
}

fn decode_g2(bytes: &[u8], subgroup_check: bool) -> Result<G2Projective, VMError> {
    if bytes.len() != G2_POINT_LEN {
        return Err(parsing_error());
    }
    if bytes.iter().all(|&byte| byte == 0) {
        return Ok(G2Projective::identity());
    }
    let x_c0 = decode_fp(&bytes[..64])?;
    let x_c1 = decode_fp(&bytes[64..128])?;
    let y_c0 = decode_fp(&bytes[128..192])?;
    let y_c1 = decode_fp(&bytes[192..])?;

    // The library's uncompressed layout is x.c1 || x.c0 || y.c1 || y.c0.
    let mut uncompressed = [0u8; 192];
    uncompressed[..48].copy_from_slice(&x_c1.to_bytes());
    uncompressed[48..96].copy_from_slice(&x_c0.to_bytes());
    uncompressed[96..144].copy_from_slice(&y_c1.to_bytes());
    uncompressed[144..].copy_from_slice(&y_c0.to_bytes());
    let point = Option::<G2Affine>::from(G2Affine::from_uncompressed_unchecked(&uncompressed))
        .ok_or_else(parsing_error)?;
    if !bool::from(point.is_on_curve()) {
        return Err(VMError::Precompile(PrecompileError::InvalidPoint));
    }
    if subgroup_check && !bool::from(point.is_torsion_free()) {
        return Err(VMError::Precompile(PrecompileError::InvalidSubgroupPoint));
    }
    Ok(G2Projective::from(&point))
}

fn encode_g2(point: &G2Projective) -> [u8; G2_POINT_LEN] {
    let affine = G2Affine::from(point);
    let mut out = [0u8; G2_POINT_LEN];
    if bool::from(affine.is_identity()) {
        return out;
    }
    let uncompressed = affine.to_uncompressed();
    // Back to c0-first wire order.
    out[..64].copy_from_slice(&encode_fp_bytes(&uncompressed[48..96]));
    out[64..128].copy_from_slice(&encode_fp_bytes(&uncompressed[..48]));
    out[128..192].copy_from_slice(&encode_fp_bytes(&uncompressed[144..192]));
    out[192..].copy_from_slice(&encode_fp_bytes(&uncompressed[96..144]));
    out
}

/// 32-byte big-endian scalar, reduced modulo the group order.
fn decode_scalar(bytes: &[u8]) -> Result<Scalar, VMError> {
    if bytes.len() != 32 {
        return Err(parsing_error());
    }
    let mut wide = [0u8; 64];
    for (i, byte) in bytes.iter().enumerate() {
        // from_bytes_wide is little-endian.
        wide[31 - i] = *byte;
    }
    Ok(Scalar::from_bytes_wide(&wide))
}

pub fn g1_add(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, G1_ADD_COST, consumed_gas)?;
    if calldata.len() != 2 * G1_POINT_LEN {
        return Err(parsing_error());
    }
    let first = decode_g1(&calldata[..G1_POINT_LEN], false)?;
    let second = decode_g1(&calldata[G1_POINT_LEN..], false)?;
    Ok(Bytes::copy_from_slice(&encode_g1(&(first + second))))
}

pub fn g1_mul(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, G1_MUL_COST, consumed_gas)?;
    if calldata.len() != G1_MUL_INPUT_LEN {
        return Err(parsing_error());
    }
    let point = decode_g1(&calldata[..G1_POINT_LEN], true)?;
    let scalar = decode_scalar(&calldata[G1_POINT_LEN..])?;
    Ok(Bytes::copy_from_slice(&encode_g1(&(point * scalar))))
}

pub fn g1_msm(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    if calldata.is_empty() || calldata.len() % G1_MUL_INPUT_LEN != 0 {
        return Err(parsing_error());
    }
    let pair_count = calldata.len() / G1_MUL_INPUT_LEN;
    increase_precompile_consumed_gas(gas_for_call, msm_cost(pair_count, G1_MUL_COST), consumed_gas)?;

    let mut accumulator = G1Projective::identity();
    for term in calldata.chunks_exact(G1_MUL_INPUT_LEN) {
        let point = decode_g1(&term[..G1_POINT_LEN], true)?;
        let scalar = decode_scalar(&term[G1_POINT_LEN..])?;
        accumulator += point * scalar;
    }
    Ok(Bytes::copy_from_slice(&encode_g1(&accumulator)))
}

pub fn g2_add(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, G2_ADD_COST, consumed_gas)?;
    if calldata.len() != 2 * G2_POINT_LEN {
        return Err(parsing_error());
    }
    let first = decode_g2(&calldata[..G2_POINT_LEN], false)?;
    let second = decode_g2(&calldata[G2_POINT_LEN..], false)?;
    Ok(Bytes::copy_from_slice(&encode_g2(&(first + second))))
}

pub fn g2_mul(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, G2_MUL_COST, consumed_gas)?;
    if calldata.len() != G2_MUL_INPUT_LEN {
        return Err(parsing_error());
    }
    let point = decode_g2(&calldata[..G2_POINT_LEN], true)?;
    let scalar = decode_scalar(&calldata[G2_POINT_LEN..])?;
    Ok(Bytes::copy_from_slice(&encode_g2(&(point * scalar))))
}

pub fn g2_msm(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    if calldata.is_empty() || calldata.len() % G2_MUL_INPUT_LEN != 0 {
        return Err(parsing_error());
    }
    let pair_count = calldata.len() / G2_MUL_INPUT_LEN;
    increase_precompile_consumed_gas(gas_for_call, msm_cost(pair_count, G2_MUL_COST), consumed_gas)?;

    let mut accumulator = G2Projective::identity();
    for term in calldata.chunks_exact(G2_MUL_INPUT_LEN) {
        let point = decode_g2(&term[..G2_POINT_LEN], true)?;
        let scalar = decode_scalar(&term[G2_POINT_LEN..])?;
        accumulator += point * scalar;
    }
    Ok(Bytes::copy_from_slice(&encode_g2(&accumulator)))
}

pub fn pairing(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    if calldata.is_empty() || calldata.len() % PAIRING_PAIR_LEN != 0 {
        return Err(parsing_error());
    }
    let pair_count = (calldata.len() / PAIRING_PAIR_LEN) as u64;
    increase_precompile_consumed_gas(
        gas_for_call,
        PAIRING_BASE_COST + PAIRING_PER_PAIR_COST * pair_count,
        consumed_gas,
    )?;

    let mut terms = Vec::with_capacity(pair_count as usize);
    for pair in calldata.chunks_exact(PAIRING_PAIR_LEN) {
        let g1 = G1Affine::from(&decode_g1(&pair[..G1_POINT_LEN], true)?);
        let g2 = G2Affine::from(&decode_g2(&pair[G1_POINT_LEN..], true)?);
        terms.push((g1, G2Prepared::from(g2)));
    }
    let refs: Vec<(&G1Affine, &G2Prepared)> =
        terms.iter().map(|(g1, g2)| (g1, g2)).collect();
    let result = multi_miller_loop(&refs).final_exponentiation();

    let mut output = [0u8; 32];
    if result == Gt::identity() {
        output[31] = 1;
    }
    Ok(Bytes::copy_from_slice(&output))
}

pub fn map_fp_to_g1(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, MAP_FP_TO_G1_COST, consumed_gas)?;
    if calldata.len() != FP_PADDED_LEN {
        return Err(parsing_error());
    }
    let element = decode_fp(calldata)?;
    let mapped = G1Projective::map_to_curve(&element).clear_h();
    Ok(Bytes::copy_from_slice(&encode_g1(&mapped)))
}

pub fn map_fp2_to_g2(
    calldata: &Bytes,
    gas_for_call: u64,
    consumed_gas: &mut u64,
    _config: &EvmConfig,
) -> Result<Bytes, VMError> {
    increase_precompile_consumed_gas(gas_for_call, MAP_FP2_TO_G2_COST, consumed_gas)?;
    if calldata.len() != 2 * FP_PADDED_LEN {
        return Err(parsing_error());
    }
    let c0 = decode_fp(&calldata[..FP_PADDED_LEN])?;
    let c1 = decode_fp(&calldata[FP_PADDED_LEN..])?;
    let element = Fp2 { c0, c1 };
    let mapped = G2Projective::map_to_curve(&element).clear_h();
    Ok(Bytes::copy_from_slice(&encode_g2(&mapped)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The canonical G1 generator in EIP-2537 encoding.
    fn g1_generator_encoded() -> [u8; G1_POINT_LEN] {
        encode_g1(&G1Projective::generator())
    }

    #[test]
    fn g1_add_identity_is_noop() {
        let mut input = Vec::new();
        input.extend_from_slice(&g1_generator_encoded());
        input.extend_from_slice(&[0u8; G1_POINT_LEN]);
        let mut consumed = 0;
        let out = g1_add(
            &Bytes::from(input),
            10_000,
            &mut consumed,
            &EvmConfig::default(),
        )
        .unwrap();
        assert_eq!(out.as_ref(), g1_generator_encoded());
        assert_eq!(consumed, G1_ADD_COST);
    }

    #[test]
    fn g1_mul_by_two_equals_double() {
        let mut input = Vec::new();
        input.extend_from_slice(&g1_generator_encoded());
        let mut scalar = [0u8; 32];
        scalar[31] = 2;
        input.extend_from_slice(&scalar);
        let mut consumed = 0;
        let doubled = g1_mul(
            &Bytes::from(input),
            20_000,
            &mut consumed,
            &EvmConfig::default(),
        )
        .unwrap();

        let expected = encode_g1(&(G1Projective::generator() + G1Projective::generator()));
        assert_eq!(doubled.as_ref(), expected);
    }

    #[test]
    fn pairing_of_inverse_pair_is_one() {
        // e(P, Q) * e(-P, Q) == 1
        let p = G1Projective::generator();
        let q = G2Projective::generator();
        let mut input = Vec::new();
        input.extend_from_slice(&encode_g1(&p));
        input.extend_from_slice(&encode_g2(&q));
        input.extend_from_slice(&encode_g1(&(-p)));
        input.extend_from_slice(&encode_g2(&q));

        let mut consumed = 0;
        let out = pairing(
            &Bytes::from(input),
            1_000_000,
            &mut consumed,
            &EvmConfig::default(),
        )
        .unwrap();
        assert_eq!(out[31], 1);
        assert_eq!(consumed, PAIRING_BASE_COST + 2 * PAIRING_PER_PAIR_COST);
    }

    #[test]
    fn off_curve_point_is_rejected() {
        let mut bad = [0u8; G1_POINT_LEN];
        bad[63] = 1; // x = 1
        bad[127] = 1; // y = 1, not on the curve
        let mut consumed = 0;
        let result = g1_add(
            &Bytes::from([bad, [0u8; G1_POINT_LEN]].concat()),
            10_000,
            &mut consumed,
            &EvmConfig::default(),
        );
        assert!(matches!(
            result,
            Err(VMError::Precompile(PrecompileError::InvalidPoint))
        ));
    }

    #[test]
    fn msm_discount_applies() {
        assert_eq!(msm_cost(1, G1_MUL_COST), G1_MUL_COST * 1200 / 1000);
        assert_eq!(msm_cost(128, G1_MUL_COST), 128 * G1_MUL_COST * 174 / 1000);
        // Counts beyond the table reuse the last discount.
        assert_eq!(msm_cost(200, G1_MUL_COST), 200 * G1_MUL_COST * 174 / 1000);
    }

    #[test]
    fn padded_field_element_requires_zero_prefix() {
        let mut bad = [0u8; FP_PADDED_LEN];
        bad[0] = 1;
        assert!(decode_fp(&bad).is_err());
    }
}
