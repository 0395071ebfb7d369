use bytes::BufMut;

use super::{
    decode::{decode_rlp_item, RLPDecode},
    encode::{encode_list_prefix, RLPEncode},
    error::RLPDecodeError,
};

/// Field-wise encoder for RLP structs.
///
/// Buffers the encoded fields and writes the list header on
/// [`Encoder::finish`]:
///
/// ```ignore
/// Encoder::new(buf)
///     .encode_field(&header.parent_hash)
///     .encode_field(&header.number)
///     .finish();
/// ```
#[must_use = "the encoded list is only written by calling `finish`"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    payload: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            payload: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.payload);
        self
    }

    /// Encodes the value only when present. Used for the optional trailing
    /// fields of fork-extended structs (e.g. post-London headers).
    pub fn encode_optional_field<T: RLPEncode>(mut self, value: &Option<T>) -> Self {
        if let Some(value) = value {
            value.encode(&mut self.payload);
        }
        self
    }

    /// Writes the field bytes as-is, without an RLP prefix.
    pub fn encode_raw(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) {
        encode_list_prefix(self.payload.len(), self.buf);
        self.buf.put_slice(&self.payload);
    }
}

/// Field-wise decoder for RLP structs, the dual of [`Encoder`].
///
/// ```ignore
/// let decoder = Decoder::new(rlp)?;
/// let (nonce, decoder) = decoder.decode_field("nonce")?;
/// let (balance, decoder) = decoder.decode_field("balance")?;
/// let rest = decoder.finish()?;
/// ```
#[derive(Debug)]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(rlp: &'a [u8]) -> Result<Self, RLPDecodeError> {
        let (is_list, payload, remaining) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        Ok(Self { payload, remaining })
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (value, payload) =
            T::decode_unfinished(self.payload).map_err(|err| RLPDecodeError::field(name, err))?;
        Ok((
            value,
            Self {
                payload,
                remaining: self.remaining,
            },
        ))
    }

    /// Decodes the next field when one is left in the list, `None` otherwise.
    /// A present-but-malformed field also yields `None`, matching the
    /// optional trailing fields of fork-extended structs.
    pub fn decode_optional_field<T: RLPDecode>(self) -> (Option<T>, Self) {
        match T::decode_unfinished(self.payload) {
            Ok((value, payload)) => (
                Some(value),
                Self {
                    payload,
                    remaining: self.remaining,
                },
            ),
            Err(_) => (None, self),
        }
    }

    /// Ends decoding, requiring the list payload to be fully consumed.
    pub fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if !self.payload.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(self.remaining)
    }

    /// Ends decoding ignoring any unconsumed trailing fields.
    pub fn finish_unchecked(self) -> &'a [u8] {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_decoder_roundtrip() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&42u64)
            .encode_field(&"cat")
            .finish();

        let decoder = Decoder::new(&buf).unwrap();
        let (num, decoder): (u64, _) = decoder.decode_field("num").unwrap();
        let (name, decoder): (String, _) = decoder.decode_field("name").unwrap();
        assert_eq!(num, 42);
        assert_eq!(name, "cat");
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn optional_fields() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&1u64)
            .encode_optional_field(&None::<u64>)
            .finish();

        let decoder = Decoder::new(&buf).unwrap();
        let (first, decoder): (u64, _) = decoder.decode_field("first").unwrap();
        let (second, decoder): (Option<u64>, _) = decoder.decode_optional_field();
        assert_eq!(first, 1);
        assert_eq!(second, None);
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn unbalanced_list_is_rejected() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&1u64)
            .encode_field(&2u64)
            .finish();

        let decoder = Decoder::new(&buf).unwrap();
        let (_, decoder): (u64, _) = decoder.decode_field("first").unwrap();
        assert!(decoder.finish().is_err());
    }
}
