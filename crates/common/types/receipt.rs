use bytes::Bytes;
use ethereum_types::{Address, Bloom, BloomInput, H256};
use serde::{Deserialize, Serialize};

use ethrun_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use super::TxType;

pub type Index = u64;

/// Outcome of one executed transaction, as committed to the receipt trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_type: TxType,
    pub succeeded: bool,
    pub cumulative_gas_used: u64,
    pub bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(tx_type: TxType, succeeded: bool, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            tx_type,
            succeeded,
            cumulative_gas_used,
            bloom: bloom_from_logs(&logs),
            logs,
        }
    }
}

pub fn bloom_from_logs(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_ref()));
        for topic in log.topics.iter() {
            bloom.accrue(BloomInput::Raw(topic.as_ref()));
        }
    }
    bloom
}

impl RLPEncode for Receipt {
    /// Typed receipts get the same envelope as typed transactions:
    /// `tx_type || rlp(receipt)`, legacy receipts are the bare list.
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        if self.tx_type != TxType::Legacy {
            buf.put_u8(self.tx_type as u8);
        }
        Encoder::new(buf)
            .encode_field(&self.succeeded)
            .encode_field(&self.cumulative_gas_used)
            .encode_field(&self.bloom)
            .encode_field(&self.logs)
            .finish();
    }
}

impl RLPDecode for Receipt {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (tx_type, rlp) = match rlp.first() {
            Some(byte) if *byte < 0x7f => {
                let tx_type =
                    TxType::from_u8(*byte).ok_or(RLPDecodeError::WrongTxType(*byte))?;
                (tx_type, &rlp[1..])
            }
            _ => (TxType::Legacy, rlp),
        };
        let decoder = Decoder::new(rlp)?;
        let (succeeded, decoder) = decoder.decode_field("succeeded")?;
        let (cumulative_gas_used, decoder) = decoder.decode_field("cumulative_gas_used")?;
        let (bloom, decoder) = decoder.decode_field("bloom")?;
        let (logs, decoder) = decoder.decode_field("logs")?;
        let receipt = Receipt {
            tx_type,
            succeeded,
            cumulative_gas_used,
            bloom,
            logs,
        };
        Ok((receipt, decoder.finish()?))
    }
}

/// Data record produced during the execution of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl RLPEncode for Log {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.address)
            .encode_field(&self.topics)
            .encode_field(&self.data)
            .finish();
    }
}

impl RLPDecode for Log {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (address, decoder) = decoder.decode_field("address")?;
        let (topics, decoder) = decoder.decode_field("topics")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let log = Log {
            address,
            topics,
            data,
        };
        Ok((log, decoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_roundtrip_typed() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![H256::repeat_byte(0x22)],
            data: Bytes::from_static(b"payload"),
        };
        let receipt = Receipt::new(TxType::EIP1559, true, 42_000, vec![log]);
        let encoded = receipt.encode_to_vec();
        assert_eq!(encoded[0], TxType::EIP1559 as u8);
        assert_eq!(Receipt::decode(&encoded).unwrap(), receipt);
    }

    #[test]
    fn bloom_covers_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![H256::repeat_byte(0x22)],
            data: Bytes::new(),
        };
        let bloom = bloom_from_logs(std::slice::from_ref(&log));
        assert!(bloom.contains_input(BloomInput::Raw(log.address.as_ref())));
        assert!(bloom.contains_input(BloomInput::Raw(log.topics[0].as_ref())));
        assert!(!bloom.contains_input(BloomInput::Raw(b"unrelated")));
    }
}
