//! Serde helpers for the `0x`-prefixed hex encodings used by JSON-RPC and
//! genesis files.

pub mod u64 {
    pub mod hex_str {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("{value:#x}"))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            let value = String::deserialize(deserializer)?;
            u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(D::Error::custom)
        }
    }

    pub mod hex_str_padding {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&format!("{value:#018x}"))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            super::hex_str::deserialize(deserializer)
        }
    }

    pub mod hex_str_opt {
        use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&format!("{value:#x}")),
                None => Option::<String>::None.serialize(serializer),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(value) => u64::from_str_radix(value.trim_start_matches("0x"), 16)
                    .map(Some)
                    .map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }

    /// Accepts either `"0x..."` hex strings or decimal (string or number),
    /// which genesis files in the wild mix freely.
    pub fn deser_hex_or_dec_str<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<u64, D::Error> {
        use serde::{de::Error, Deserialize};
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum HexOrDec {
            Number(u64),
            String(String),
        }
        match HexOrDec::deserialize(deserializer)? {
            HexOrDec::Number(value) => Ok(value),
            HexOrDec::String(value) => {
                if let Some(hex) = value.strip_prefix("0x") {
                    u64::from_str_radix(hex, 16).map_err(D::Error::custom)
                } else {
                    value.parse().map_err(D::Error::custom)
                }
            }
        }
    }
}

pub mod u256 {
    use ethereum_types::U256;
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deser_hex_or_dec_str<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<U256, D::Error> {
        let value = String::deserialize(deserializer)?;
        if let Some(hex) = value.strip_prefix("0x") {
            U256::from_str_radix(hex, 16).map_err(D::Error::custom)
        } else {
            U256::from_dec_str(&value).map_err(D::Error::custom)
        }
    }
}

pub mod bytes {
    use ::bytes::Bytes;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let value = String::deserialize(deserializer)?;
        let bytes = hex::decode(value.trim_start_matches("0x")).map_err(D::Error::custom)?;
        Ok(Bytes::from(bytes))
    }
}

pub mod bytes48 {
    pub mod vec {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &[[u8; 48]],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(value.iter().map(|item| format!("0x{}", hex::encode(item))))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<[u8; 48]>, D::Error> {
            let values = Vec::<String>::deserialize(deserializer)?;
            values
                .into_iter()
                .map(|value| {
                    let bytes =
                        hex::decode(value.trim_start_matches("0x")).map_err(D::Error::custom)?;
                    bytes
                        .try_into()
                        .map_err(|_| D::Error::custom("expected 48 bytes"))
                })
                .collect()
        }
    }
}

pub mod blob {
    pub mod vec {
        use crate::types::BYTES_PER_BLOB;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &[[u8; BYTES_PER_BLOB]],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(
                value
                    .iter()
                    .map(|item| format!("0x{}", hex::encode(item.as_slice()))),
            )
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<[u8; BYTES_PER_BLOB]>, D::Error> {
            let values = Vec::<String>::deserialize(deserializer)?;
            values
                .into_iter()
                .map(|value| {
                    let bytes =
                        hex::decode(value.trim_start_matches("0x")).map_err(D::Error::custom)?;
                    bytes
                        .try_into()
                        .map_err(|_| D::Error::custom("expected a full blob"))
                })
                .collect()
        }
    }
}
