//! Bencode encoder. Canonical and deterministic: dictionary keys are
//! always written in raw-byte sorted order (guaranteed here by storing
//! dictionaries as a `BTreeMap<Vec<u8>, BValue>`), which is the property
//! that makes info-hash computation well-defined — re-encoding a
//! canonical `info` dictionary reproduces it byte-for-byte.

use super::BValue;

pub fn encode_value(value: &BValue, out: &mut Vec<u8>) {
    match value {
        BValue::Integer(n) => encode_integer(*n, out),
        BValue::Bytes(s) => encode_bytes(s, out),
        BValue::List(items) => encode_list(items, out),
        BValue::Dict(map) => encode_dict(map, out),
    }
}

fn encode_integer(n: i64, out: &mut Vec<u8>) {
    out.push(b'i');
    out.extend_from_slice(n.to_string().as_bytes());
    out.push(b'e');
}

fn encode_bytes(s: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(s.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(s);
}

fn encode_list(items: &[BValue], out: &mut Vec<u8>) {
    out.push(b'l');
    for item in items {
        encode_value(item, out);
    }
    out.push(b'e');
}

fn encode_dict(map: &std::collections::BTreeMap<Vec<u8>, BValue>, out: &mut Vec<u8>) {
    out.push(b'd');
    for (key, value) in map {
        encode_bytes(key, out);
        encode_value(value, out);
    }
    out.push(b'e');
}
