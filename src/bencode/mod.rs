//! Bencode codec: a tagged value tree plus canonical decode/encode.
//!
//! Bencode (pronounced like B-encode) supports four data types:
//! - Byte strings: `<length>:<contents>` (e.g. `4:spam`)
//! - Integers: `i<number>e` (e.g. `i42e`)
//! - Lists: `l<bencoded values>e` (e.g. `l4:spami42ee`)
//! - Dictionaries: `d<bencoded string><bencoded value>e` (e.g. `d3:bar4:spam3:fooi42ee`)
//!
//! Byte strings are never interpreted as UTF-8 here: `pieces` and tracker
//! `peers` fields are opaque binary data and must round-trip byte-for-byte.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/// A decoded bencode value.
///
/// Dictionaries are stored as a `BTreeMap<Vec<u8>, BValue>`, which orders
/// keys by raw byte value — exactly the canonical ordering the BitTorrent
/// spec requires for re-encoding, so the encoder never needs an explicit
/// sort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BValue>),
    Dict(BTreeMap<Vec<u8>, BValue>),
}

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("invalid length prefix: {0}")]
    InvalidLength(String),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("unterminated list or dictionary")]
    UnterminatedContainer,

    #[error("dictionary key must be a byte string")]
    NonStringKey,

    #[error("dictionary keys are not in sorted order")]
    UnsortedKeys,

    #[error("trailing data after top-level value")]
    TrailingData,

    #[error("unexpected byte {0:#04x}")]
    UnknownTag(u8),
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;

impl BValue {
    pub fn as_bytes(&self) -> BencodeResult<&[u8]> {
        match self {
            BValue::Bytes(b) => Ok(b),
            _ => Err(BencodeError::InvalidLength(
                "expected byte string".to_string(),
            )),
        }
    }

    pub fn as_integer(&self) -> BencodeResult<i64> {
        match self {
            BValue::Integer(n) => Ok(*n),
            _ => Err(BencodeError::InvalidInteger("expected integer".to_string())),
        }
    }

    pub fn as_dict(&self) -> BencodeResult<&BTreeMap<Vec<u8>, BValue>> {
        match self {
            BValue::Dict(d) => Ok(d),
            _ => Err(BencodeError::NonStringKey),
        }
    }

    pub fn as_list(&self) -> BencodeResult<&[BValue]> {
        match self {
            BValue::List(l) => Ok(l),
            _ => Err(BencodeError::UnterminatedContainer),
        }
    }

    /// Decodes a top-level value, failing if any bytes remain afterwards.
    pub fn decode(input: &[u8]) -> BencodeResult<Self> {
        let (value, rest) = decoder::decode_value(input)?;
        if !rest.is_empty() {
            return Err(BencodeError::TrailingData);
        }
        Ok(value)
    }

    /// Encodes into its canonical bencoded byte representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encoder::encode_value(self, &mut out);
        out
    }

    /// Renders as JSON text, decoding byte strings as UTF-8 (lossily).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BValue::Integer(n) => serde_json::Value::Number((*n).into()),
            BValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            BValue::List(items) => serde_json::Value::Array(items.iter().map(BValue::to_json).collect()),
            BValue::Dict(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for BValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&[u8], BValue)]) -> BValue {
        BValue::Dict(pairs.iter().map(|(k, v)| (k.to_vec(), v.clone())).collect())
    }

    #[test]
    fn round_trips_canonical_vectors() {
        let vectors: &[&[u8]] = &[
            b"i0e",
            b"i-42e",
            b"i9223372036854775807e",
            b"4:spam",
            b"0:",
            b"l4:spami3ee",
            b"d3:cow3:moo4:spaml1:a1:bee",
            b"de",
            b"le",
        ];
        for v in vectors {
            let decoded = BValue::decode(v).unwrap();
            assert_eq!(decoded.encode(), *v);
        }
    }

    #[test]
    fn dict_keys_sort_by_raw_bytes_regardless_of_insertion_order() {
        let a = dict(&[(b"b", BValue::Integer(1)), (b"a", BValue::Integer(2))]);
        let b = dict(&[(b"a", BValue::Integer(2)), (b"b", BValue::Integer(1))]);
        assert_eq!(a.encode(), b.encode());
        assert_eq!(a.encode(), b"d1:ai2e1:bi1ee");
    }

    #[test]
    fn byte_string_with_embedded_nul_round_trips() {
        let v = b"3:a\x00b";
        let decoded = BValue::decode(v).unwrap();
        assert_eq!(decoded.as_bytes().unwrap(), b"a\x00b");
        assert_eq!(decoded.encode(), v);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["i03e", "i-0e", "3:ab", "i", "d1:ai1e", "5:"] {
            assert!(
                BValue::decode(bad.as_bytes()).is_err(),
                "expected error for {bad:?}"
            );
        }
    }
}
