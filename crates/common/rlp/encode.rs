use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H256, H32, H512, H64, U256};
use tinyvec::ArrayVec;

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

/// Trait for encoding a value into RLP.
/// Implementors only need [`RLPEncode::encode`]; `length` is derived and is
/// only worth overriding for fixed-size items.
pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Writes the big-endian bytes of `n` stripped of leading zeros, with the
/// canonical string prefix.
fn encode_be_stripped(bytes: &[u8], buf: &mut dyn BufMut) {
    match bytes.iter().position(|&b| b != 0) {
        None => buf.put_u8(RLP_NULL),
        Some(start) => {
            let significant = &bytes[start..];
            if significant.len() == 1 && significant[0] < RLP_NULL {
                buf.put_u8(significant[0]);
            } else {
                buf.put_u8(RLP_NULL + significant.len() as u8);
                buf.put_slice(significant);
            }
        }
    }
}

macro_rules! impl_rlp_encode_uint {
    ($($t:ty),*) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                encode_be_stripped(&self.to_be_bytes(), buf);
            }
        })*
    };
}

impl_rlp_encode_uint!(u8, u16, u32, u64, usize, u128);

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(if *self { 0x01 } else { RLP_NULL });
    }

    fn length(&self) -> usize {
        1
    }
}

impl RLPEncode for () {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(RLP_NULL);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
        } else {
            if self.len() < 56 {
                buf.put_u8(RLP_NULL + self.len() as u8);
            } else {
                let mut len_be = ArrayVec::<[u8; 8]>::new();
                len_be.extend_from_slice(&self.len().to_be_bytes());
                let skip = len_be.iter().take_while(|&&b| b == 0).count();
                buf.put_u8(0xb7 + (len_be.len() - skip) as u8);
                buf.put_slice(&len_be[skip..]);
            }
            buf.put_slice(self);
        }
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for &str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut be = [0u8; 32];
        self.to_big_endian(&mut be);
        encode_be_stripped(&be, buf);
    }
}

macro_rules! impl_rlp_encode_hash {
    ($($t:ty),*) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                self.as_bytes().encode(buf)
            }
        })*
    };
}

impl_rlp_encode_hash!(H32, H64, H256, H512, Address, Bloom);

/// Writes the list prefix for a payload of `payload_len` bytes.
pub(crate) fn encode_list_prefix(payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len < 56 {
        buf.put_u8(RLP_EMPTY_LIST + payload_len as u8);
    } else {
        let mut len_be = ArrayVec::<[u8; 8]>::new();
        len_be.extend_from_slice(&payload_len.to_be_bytes());
        let skip = len_be.iter().take_while(|&&b| b == 0).count();
        buf.put_u8(0xf7 + (len_be.len() - skip) as u8);
        buf.put_slice(&len_be[skip..]);
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let payload_len: usize = self.iter().map(RLPEncode::length).sum();
        encode_list_prefix(payload_len, buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: RLPEncode> RLPEncode for &T {
    fn encode(&self, buf: &mut dyn BufMut) {
        (*self).encode(buf)
    }
}

impl<S: RLPEncode, T: RLPEncode> RLPEncode for (S, T) {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_list_prefix(self.0.length() + self.1.length(), buf);
        self.0.encode(buf);
        self.1.encode(buf);
    }
}

impl<S: RLPEncode, T: RLPEncode, U: RLPEncode> RLPEncode for (S, T, U) {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_list_prefix(self.0.length() + self.1.length() + self.2.length(), buf);
        self.0.encode(buf);
        self.1.encode(buf);
        self.2.encode(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encode_integers() {
        assert_eq!(0u64.encode_to_vec(), vec![0x80]);
        assert_eq!(1u64.encode_to_vec(), vec![0x01]);
        assert_eq!(0x7fu64.encode_to_vec(), vec![0x7f]);
        assert_eq!(0x80u64.encode_to_vec(), vec![0x81, 0x80]);
        assert_eq!(1024u64.encode_to_vec(), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn encode_strings() {
        assert_eq!("dog".encode_to_vec(), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(b"".as_ref().encode_to_vec(), vec![0x80]);
        let long = [0xau8; 60];
        let encoded = long.encode_to_vec();
        assert_eq!(&encoded[..2], &[0xb8, 60]);
        assert_eq!(&encoded[2..], &long);
    }

    #[test]
    fn encode_list() {
        let list: Vec<u64> = vec![1, 2, 3];
        assert_eq!(list.encode_to_vec(), vec![0xc3, 0x01, 0x02, 0x03]);
        let empty: Vec<u64> = vec![];
        assert_eq!(empty.encode_to_vec(), vec![0xc0]);
    }

    #[test]
    fn encode_u256() {
        let value = U256::from_big_endian(&hex!(
            "0000000000000000000000000000000000000000000000000aa87bee538000"
        ));
        assert_eq!(value.encode_to_vec(), hex!("870aa87bee538000").to_vec());
    }
}
