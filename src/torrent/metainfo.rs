//! BitTorrent metainfo file parser and utilities.
//!
//! A torrent file (also known as a metainfo file) contains metadata about the
//! file to be shared in the BitTorrent protocol. This module parses that
//! bencoded dictionary directly off of [`BValue`] rather than through a
//! separate serde layer, since `info_hash` needs the raw, byte-exact
//! sub-dictionary that was actually parsed.
//!
//! The torrent file is a bencoded dictionary containing:
//!
//! - `announce`: URL of the tracker server that coordinates peers
//! - `info`: dictionary containing core metadata about the file:
//!   - `name`: suggested filename
//!   - `length`: total size in bytes (single-file torrents only)
//!   - `piece length`: number of bytes per piece
//!   - `pieces`: concatenated 20-byte SHA-1 hashes of every piece
//!   - `private`, `md5sum`: optional, passed through if present
//!
//! This implementation only supports single-file torrents; multi-file
//! torrents use a different `info` layout and are out of scope.

use std::path::Path;

use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::bencode::{BValue, BencodeError};
use crate::torrent::geometry;

#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("malformed bencode: {0}")]
    Bencode(#[from] BencodeError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {0} has the wrong bencode type")]
    WrongType(&'static str),

    #[error("pieces field length {0} is not a multiple of 20")]
    InvalidPiecesLength(usize),

    #[error("failed to read torrent file: {0}")]
    Io(#[from] std::io::Error),
}

pub type MetainfoResult<T> = std::result::Result<T, MetainfoError>;

/// The `info` sub-dictionary: the part that is hashed to produce the
/// torrent's info-hash, and whose layout is shared by every torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub pieces: Vec<u8>,
    pub private: Option<bool>,
    pub md5sum: Option<String>,
    /// The raw decoded `info` value, kept so `info_hash` can re-encode it
    /// byte-for-byte instead of reconstructing it field by field.
    raw: BValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetainfo {
    pub announce: String,
    pub info: TorrentInfo,
}

impl TorrentInfo {
    fn from_bvalue(raw: BValue) -> MetainfoResult<Self> {
        let dict = raw.as_dict()?;

        let name = dict
            .get(b"name".as_slice())
            .ok_or(MetainfoError::MissingField("info.name"))?
            .as_bytes()?;
        let name = String::from_utf8_lossy(name).into_owned();

        let length = dict
            .get(b"length".as_slice())
            .ok_or(MetainfoError::MissingField("info.length"))?
            .as_integer()?;
        if length < 0 {
            return Err(MetainfoError::WrongType("info.length"));
        }

        let piece_length = dict
            .get(b"piece length".as_slice())
            .ok_or(MetainfoError::MissingField("info.piece length"))?
            .as_integer()?;
        if piece_length <= 0 {
            return Err(MetainfoError::WrongType("info.piece length"));
        }

        let pieces = dict
            .get(b"pieces".as_slice())
            .ok_or(MetainfoError::MissingField("info.pieces"))?
            .as_bytes()?
            .to_vec();
        if pieces.len() % 20 != 0 {
            return Err(MetainfoError::InvalidPiecesLength(pieces.len()));
        }

        let private = match dict.get(b"private".as_slice()) {
            Some(v) => Some(v.as_integer()? != 0),
            None => None,
        };

        let md5sum = match dict.get(b"md5sum".as_slice()) {
            Some(v) => Some(String::from_utf8_lossy(v.as_bytes()?).into_owned()),
            None => None,
        };

        Ok(TorrentInfo {
            name,
            length: length as u64,
            piece_length: piece_length as u64,
            pieces,
            private,
            md5sum,
            raw,
        })
    }

    pub fn piece_hashes(&self) -> impl Iterator<Item = &[u8]> {
        self.pieces.chunks_exact(20)
    }

    pub fn piece_count(&self) -> usize {
        geometry::piece_count(self.length, self.piece_length)
    }

    /// Length of piece `index`, accounting for the shorter final piece.
    pub fn piece_size(&self, index: usize) -> u64 {
        geometry::piece_length(self.length, self.piece_length, index)
    }
}

impl TorrentMetainfo {
    pub fn from_bytes(bytes: &[u8]) -> MetainfoResult<Self> {
        let value = BValue::decode(bytes)?;
        let dict = value.as_dict()?;

        let announce = dict
            .get(b"announce".as_slice())
            .ok_or(MetainfoError::MissingField("announce"))?
            .as_bytes()?;
        let announce = String::from_utf8_lossy(announce).into_owned();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?
            .clone();
        let info = TorrentInfo::from_bvalue(info_value)?;

        Ok(TorrentMetainfo { announce, info })
    }

    pub fn from_file(path: impl AsRef<Path>) -> MetainfoResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// SHA-1 digest of the canonically re-bencoded `info` dictionary.
    pub fn info_hash(&self) -> [u8; 20] {
        let encoded = self.info.raw.encode();
        let mut hasher = Sha1::new();
        hasher.update(&encoded);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut pieces = Vec::new();
        for b in 0u8..4 {
            pieces.extend(std::iter::repeat(b).take(20));
        }
        let info = BValue::Dict(
            [
                (b"length".to_vec(), BValue::Integer(100)),
                (b"name".to_vec(), BValue::Bytes(b"sample.txt".to_vec())),
                (b"piece length".to_vec(), BValue::Integer(32)),
                (b"pieces".to_vec(), BValue::Bytes(pieces)),
            ]
            .into_iter()
            .collect(),
        );
        let top = BValue::Dict(
            [
                (
                    b"announce".to_vec(),
                    BValue::Bytes(b"http://tracker.example/announce".to_vec()),
                ),
                (b"info".to_vec(), info),
            ]
            .into_iter()
            .collect(),
        );
        top.encode()
    }

    #[test]
    fn parses_required_fields() {
        let bytes = sample_bytes();
        let meta = TorrentMetainfo::from_bytes(&bytes).unwrap();
        assert_eq!(meta.announce, "http://tracker.example/announce");
        assert_eq!(meta.info.name, "sample.txt");
        assert_eq!(meta.info.length, 100);
        assert_eq!(meta.info.piece_length, 32);
        assert_eq!(meta.info.piece_count(), 4);
        assert_eq!(meta.info.piece_size(3), 4);
    }

    #[test]
    fn info_hash_is_stable_across_parses() {
        let bytes = sample_bytes();
        let a = TorrentMetainfo::from_bytes(&bytes).unwrap();
        let b = TorrentMetainfo::from_bytes(&bytes).unwrap();
        assert_eq!(a.info_hash(), b.info_hash());
        assert_eq!(a.info_hash().len(), 20);
    }

    #[test]
    fn missing_field_is_rejected() {
        let top = BValue::Dict(
            [(b"announce".to_vec(), BValue::Bytes(b"http://x".to_vec()))]
                .into_iter()
                .collect(),
        );
        let err = TorrentMetainfo::from_bytes(&top.encode()).unwrap_err();
        assert!(matches!(err, MetainfoError::MissingField("info")));
    }

    #[test]
    fn pieces_length_not_multiple_of_20_is_rejected() {
        let info = BValue::Dict(
            [
                (b"length".to_vec(), BValue::Integer(10)),
                (b"name".to_vec(), BValue::Bytes(b"x".to_vec())),
                (b"piece length".to_vec(), BValue::Integer(10)),
                (b"pieces".to_vec(), BValue::Bytes(vec![0u8; 19])),
            ]
            .into_iter()
            .collect(),
        );
        let top = BValue::Dict(
            [
                (b"announce".to_vec(), BValue::Bytes(b"http://x".to_vec())),
                (b"info".to_vec(), info),
            ]
            .into_iter()
            .collect(),
        );
        let err = TorrentMetainfo::from_bytes(&top.encode()).unwrap_err();
        assert!(matches!(err, MetainfoError::InvalidPiecesLength(19)));
    }
}
