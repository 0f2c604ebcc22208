//! Bencode decoder following the BitTorrent metainfo specification
//! (<http://www.bittorrent.org/beps/bep_0003.html#bencoding>).
//!
//! The decoder works over raw bytes rather than `str`: bencoded byte
//! strings carry arbitrary binary data (piece hashes, compact peer lists),
//! and treating them as UTF-8 text would corrupt them. Each parse function
//! returns the parsed value together with the unconsumed suffix of the
//! input, so containers can recurse without re-slicing from the start.

use super::{BValue, BencodeError, BencodeResult};
use std::collections::BTreeMap;

/// Decodes the next bencoded value, returning it and the remaining bytes.
pub fn decode_value(input: &[u8]) -> BencodeResult<(BValue, &[u8])> {
    match input.first() {
        Some(b'i') => decode_integer(input).map(|(n, rest)| (BValue::Integer(n), rest)),
        Some(b'l') => decode_list(input),
        Some(b'd') => decode_dict(input),
        Some(b'0'..=b'9') => decode_bytes(input).map(|(b, rest)| (BValue::Bytes(b), rest)),
        Some(&tag) => Err(BencodeError::UnknownTag(tag)),
        None => Err(BencodeError::UnexpectedEof),
    }
}

fn decode_integer(input: &[u8]) -> BencodeResult<(i64, &[u8])> {
    let rest = &input[1..]; // consume 'i'
    let end = find(rest, b'e').ok_or(BencodeError::UnexpectedEof)?;
    let digits = &rest[..end];
    validate_integer_digits(digits)?;
    let text = std::str::from_utf8(digits)
        .map_err(|_| BencodeError::InvalidInteger("non-UTF8 digits".to_string()))?;
    let value = text
        .parse::<i64>()
        .map_err(|e| BencodeError::InvalidInteger(e.to_string()))?;
    Ok((value, &rest[end + 1..]))
}

/// Rejects leading zeros (other than a bare `0`) and `-0`, per spec.
fn validate_integer_digits(digits: &[u8]) -> BencodeResult<()> {
    if digits.is_empty() {
        return Err(BencodeError::InvalidInteger("empty integer".to_string()));
    }
    if digits == b"-0" {
        return Err(BencodeError::InvalidInteger("-0 is not allowed".to_string()));
    }
    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.len() > 1 && unsigned[0] == b'0' {
        return Err(BencodeError::InvalidInteger("leading zero".to_string()));
    }
    if unsigned.iter().any(|b| !b.is_ascii_digit()) {
        return Err(BencodeError::InvalidInteger(
            "non-decimal digit".to_string(),
        ));
    }
    Ok(())
}

fn decode_bytes(input: &[u8]) -> BencodeResult<(Vec<u8>, &[u8])> {
    let colon = find(input, b':').ok_or(BencodeError::UnexpectedEof)?;
    let len_bytes = &input[..colon];
    if len_bytes.iter().any(|b| !b.is_ascii_digit()) {
        return Err(BencodeError::InvalidLength(
            "length prefix must be decimal".to_string(),
        ));
    }
    let len: usize = std::str::from_utf8(len_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BencodeError::InvalidLength(String::from_utf8_lossy(len_bytes).into_owned()))?;

    let rest = &input[colon + 1..];
    if rest.len() < len {
        return Err(BencodeError::UnexpectedEof);
    }
    Ok((rest[..len].to_vec(), &rest[len..]))
}

fn decode_list(input: &[u8]) -> BencodeResult<(BValue, &[u8])> {
    let mut rest = &input[1..]; // consume 'l'
    let mut items = Vec::new();
    loop {
        match rest.first() {
            Some(b'e') => return Ok((BValue::List(items), &rest[1..])),
            Some(_) => {
                let (value, next) = decode_value(rest)?;
                items.push(value);
                rest = next;
            }
            None => return Err(BencodeError::UnterminatedContainer),
        }
    }
}

/// Keys are stored in a `BTreeMap`, so a dictionary whose keys weren't
/// already in sorted order still decodes and still re-encodes canonically —
/// only the decoded *value* is affected by key order, never the outcome of
/// a later `encode()`. Source-order sortedness is therefore not enforced
/// here.
fn decode_dict(input: &[u8]) -> BencodeResult<(BValue, &[u8])> {
    let mut rest = &input[1..]; // consume 'd'
    let mut map = BTreeMap::new();
    loop {
        match rest.first() {
            Some(b'e') => return Ok((BValue::Dict(map), &rest[1..])),
            Some(_) => {
                let (key, next) = decode_bytes(rest)?;
                let (value, next) = decode_value(next)?;
                map.insert(key, value);
                rest = next;
            }
            None => return Err(BencodeError::UnterminatedContainer),
        }
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}
