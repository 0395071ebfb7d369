use bytes::Bytes;
use ethereum_types::{Address, Bloom, H160, H256, H32, H512, H64, U256};

use super::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};

/// Trait for decoding values from canonical RLP.
/// Implementors provide [`RLPDecode::decode_unfinished`], which returns the
/// decoded value along with the not-yet-consumed remainder of the input.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Left-pads a big-endian byte string into an `N`-byte array, rejecting
/// non-canonical (leading-zero) and oversized encodings.
pub(crate) fn static_left_pad<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    if bytes.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    if bytes.first() == Some(&0) {
        return Err(RLPDecodeError::LeadingZero);
    }
    let mut padded = [0u8; N];
    padded[N - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

/// Decodes the framing of a single RLP item.
/// Returns (is_list, payload without prefix, remaining input).
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first = *data.first().ok_or(RLPDecodeError::InvalidLength)?;
    let (is_list, header_len, payload_len) = match first {
        0..=0x7f => return Ok((false, &data[..1], &data[1..])),
        0x80..=0xb7 => (false, 1, (first - RLP_NULL) as usize),
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            (false, 1 + len_of_len, decode_length_bytes(data, len_of_len)?)
        }
        RLP_EMPTY_LIST..=0xf7 => (true, 1, (first - RLP_EMPTY_LIST) as usize),
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            (true, 1 + len_of_len, decode_length_bytes(data, len_of_len)?)
        }
    };
    let total = header_len
        .checked_add(payload_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if data.len() < total {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok((is_list, &data[header_len..total], &data[total..]))
}

fn decode_length_bytes(data: &[u8], len_of_len: usize) -> Result<usize, RLPDecodeError> {
    let bytes = data
        .get(1..1 + len_of_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    let padded: [u8; 8] = static_left_pad(bytes)?;
    let length = usize::from_be_bytes(padded);
    // Lengths below 56 must use the short form.
    if length < 56 {
        return Err(RLPDecodeError::MalformedData);
    }
    Ok(length)
}

/// Decodes a byte-string item, rejecting lists.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// True when the next item is a byte string (used to tell typed-envelope
/// transactions apart from legacy lists on the wire).
pub fn is_encoded_as_bytes(rlp: &[u8]) -> Result<bool, RLPDecodeError> {
    let first = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
    Ok(first < RLP_EMPTY_LIST)
}

/// Payload of a byte-string item (the canonical tx bytes inside a wire item).
pub fn get_rlp_bytes_item_payload(rlp: &[u8]) -> Result<&[u8], RLPDecodeError> {
    decode_bytes(rlp).map(|(payload, _)| payload)
}

impl RLPDecode for bool {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        match rlp.first() {
            Some(&RLP_NULL) => Ok((false, &rlp[1..])),
            Some(&0x01) => Ok((true, &rlp[1..])),
            Some(_) => Err(RLPDecodeError::MalformedBoolean),
            None => Err(RLPDecodeError::InvalidLength),
        }
    }
}

macro_rules! impl_rlp_decode_uint {
    ($($t:ty),*) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (bytes, rest) = decode_bytes(rlp)?;
                let padded = static_left_pad(bytes)?;
                Ok((<$t>::from_be_bytes(padded), rest))
            }
        })*
    };
}

impl_rlp_decode_uint!(u8, u16, u32, u64, usize, u128);

impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = bytes.try_into().map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded: [u8; 32] = static_left_pad(bytes)?;
        Ok((U256::from_big_endian(&padded), rest))
    }
}

macro_rules! impl_rlp_decode_hash {
    ($($t:ident),*) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (value, rest) = RLPDecode::decode_unfinished(rlp)?;
                Ok(($t(value), rest))
            }
        })*
    };
}

impl_rlp_decode_hash!(H32, H64, H256, H512, Bloom);

impl RLPDecode for Address {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (value, rest) = RLPDecode::decode_unfinished(rlp)?;
        Ok((H160(value), rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut result = Vec::new();
        let mut current = payload;
        while !current.is_empty() {
            let (item, remaining) = T::decode_unfinished(current)?;
            result.push(item);
            current = remaining;
        }
        Ok((result, rest))
    }
}

impl<T1: RLPDecode, T2: RLPDecode> RLPDecode for (T1, T2) {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let (first, payload) = T1::decode_unfinished(payload)?;
        let (second, payload) = T2::decode_unfinished(payload)?;
        if !payload.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(((first, second), rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_integers() {
        assert_eq!(u64::decode(&[0x80]).unwrap(), 0);
        assert_eq!(u64::decode(&[0x09]).unwrap(), 9);
        assert_eq!(u64::decode(&[0x82, 0x04, 0x00]).unwrap(), 1024);
    }

    #[test]
    fn reject_leading_zeros() {
        // 0x0400 encoded with a spurious leading zero byte
        assert_eq!(
            u64::decode(&[0x83, 0x00, 0x04, 0x00]),
            Err(RLPDecodeError::LeadingZero)
        );
        assert_eq!(
            U256::decode(&[0x82, 0x00, 0x01]),
            Err(RLPDecodeError::LeadingZero)
        );
    }

    #[test]
    fn reject_non_canonical_long_form() {
        // 3-byte string wrongly encoded with a length-of-length prefix
        assert_eq!(
            decode_rlp_item(&[0xb8, 0x03, 0x01, 0x02, 0x03]),
            Err(RLPDecodeError::MalformedData)
        );
    }

    #[test]
    fn decode_vec_roundtrip() {
        use crate::encode::RLPEncode;
        let list: Vec<u64> = vec![7, 0, 0xdead];
        let encoded = list.encode_to_vec();
        assert_eq!(<Vec<u64>>::decode(&encoded).unwrap(), list);
    }

    #[test]
    fn decode_pair() {
        use crate::encode::RLPEncode;
        let pair = (5u64, 10u64);
        let encoded = pair.encode_to_vec();
        assert_eq!(<(u64, u64)>::decode(&encoded).unwrap(), pair);
    }
}
