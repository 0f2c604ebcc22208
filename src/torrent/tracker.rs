//! Tracker communication and peer discovery.
//!
//! Contacts a torrent's announce URL over HTTP GET and parses the compact
//! peer list out of the bencoded response. `info_hash` and `peer_id` are
//! raw 20-byte values and must be percent-encoded byte-by-byte rather than
//! through a text-oriented URL-encoding helper, since they are not valid
//! UTF-8 in general.

use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info};

use crate::bencode::{BValue, BencodeError};
use crate::torrent::peer::PeerId;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed tracker response: {0}")]
    Bencode(#[from] BencodeError),

    #[error("tracker returned failure reason: {0}")]
    Failure(String),

    #[error("tracker response has no peers field")]
    MissingPeers,

    #[error("peers field length {0} is not a multiple of 6")]
    InvalidPeersLength(usize),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub peer_id: PeerId,
    pub port: u16,
    pub compact: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            peer_id: [0u8; 20],
            port: 6881,
            compact: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Percent-encodes every byte, as required for `info_hash`/`peer_id` query
/// parameters: both are raw 20-byte values, not text.
fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Contacts a tracker to get a list of peers for a torrent.
pub async fn get_peers(
    announce_url: &str,
    info_hash: [u8; 20],
    left: u64,
    config: &TrackerConfig,
) -> TrackerResult<Vec<PeerAddr>> {
    let url = format!(
        "{}?info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact={}",
        announce_url,
        percent_encode_bytes(&info_hash),
        percent_encode_bytes(&config.peer_id),
        config.port,
        left,
        config.compact as u8,
    );

    debug!(url, "announcing to tracker");
    let response = reqwest::get(url).await?;
    let body = response.bytes().await?;

    let value = BValue::decode(&body)?;
    let dict = value.as_dict()?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()) {
        let reason = String::from_utf8_lossy(reason.as_bytes()?).into_owned();
        return Err(TrackerError::Failure(reason));
    }

    let peers_value = dict
        .get(b"peers".as_slice())
        .ok_or(TrackerError::MissingPeers)?;
    let peers_bytes = peers_value.as_bytes()?;
    if peers_bytes.len() % 6 != 0 {
        return Err(TrackerError::InvalidPeersLength(peers_bytes.len()));
    }

    let peers: Vec<PeerAddr> = peers_bytes
        .chunks_exact(6)
        .map(|chunk| PeerAddr {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        })
        .collect();

    info!(count = peers.len(), "received peer list from tracker");
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encodes_all_non_unreserved_bytes() {
        let encoded = percent_encode_bytes(&[0x00, b'a', 0xff, b'-']);
        assert_eq!(encoded, "%00a%FF-");
    }

    #[test]
    fn parses_compact_peer_list() {
        let peers_bytes: Vec<u8> = vec![127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 2, 0x1A, 0xE2];
        let dict = BValue::Dict(
            [(b"peers".to_vec(), BValue::Bytes(peers_bytes))]
                .into_iter()
                .collect(),
        );
        let bytes = dict.as_dict().unwrap();
        let parsed: Vec<PeerAddr> = bytes
            .get(b"peers".as_slice())
            .unwrap()
            .as_bytes()
            .unwrap()
            .chunks_exact(6)
            .map(|c| PeerAddr {
                ip: Ipv4Addr::new(c[0], c[1], c[2], c[3]),
                port: u16::from_be_bytes([c[4], c[5]]),
            })
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].to_string(), "127.0.0.1:6881");
        assert_eq!(parsed[1].to_string(), "10.0.0.2:6882");
    }

    #[test]
    fn rejects_peers_length_not_multiple_of_6() {
        let bad = vec![0u8; 7];
        assert!(bad.len() % 6 != 0);
    }
}
