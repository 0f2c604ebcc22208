//! A single peer session: handshake plus sequential block-by-block piece
//! download over one TCP connection.
//!
//! The session does not consult the peer's bitfield before requesting
//! pieces — it simply sends `Interested` and waits for `Unchoke`, then
//! requests every block of the piece in order. Any `Bitfield`, `Have`, or
//! `KeepAlive` message seen while waiting for something else is noise and
//! is discarded; a coordinator that wants to avoid requesting pieces a
//! peer doesn't have is expected to filter peers itself.

use std::net::SocketAddr;
use std::time::Duration;

use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::message::{Message, MessageError};

pub type PeerId = [u8; 20];

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";
const BLOCK_SIZE: u32 = 16 * 1024;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Message(#[from] MessageError),

    #[error("peer connection timed out")]
    Timeout,

    #[error("handshake protocol string mismatch")]
    HandshakeProtocolMismatch,

    #[error("handshake info_hash mismatch")]
    HandshakeInfoHashMismatch,

    #[error("connection closed while waiting for {0}")]
    ConnectionClosed(&'static str),

    #[error("received piece for index {got_index}/offset {got_begin}, expected index {want_index}/offset {want_begin}")]
    UnexpectedPiece {
        want_index: u32,
        want_begin: u32,
        got_index: u32,
        got_begin: u32,
    },

    #[error("piece {index} failed SHA-1 verification")]
    PieceHashMismatch { index: usize },
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub peer_id: PeerId,
    pub info_hash: [u8; 20],
    pub connect_timeout: Duration,
    pub message_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            peer_id: [0u8; 20],
            info_hash: [0u8; 20],
            connect_timeout: Duration::from_secs(5),
            message_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub struct Peer {
    addr: SocketAddr,
    config: PeerConfig,
    stream: Option<TcpStream>,
    pub remote_peer_id: Option<PeerId>,
}

impl Peer {
    pub fn new(addr: SocketAddr, config: PeerConfig) -> Self {
        Self {
            addr,
            config,
            stream: None,
            remote_peer_id: None,
        }
    }

    pub async fn connect(&mut self) -> PeerResult<()> {
        debug!(addr = %self.addr, "connecting to peer");
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PeerError::Timeout)??;
        self.stream = Some(stream);
        self.handshake().await
    }

    async fn handshake(&mut self) -> PeerResult<()> {
        let stream = self.stream.as_mut().expect("connect sets stream");

        let mut message = Vec::with_capacity(68);
        message.push(19u8);
        message.extend_from_slice(PROTOCOL);
        message.extend_from_slice(&[0u8; 8]);
        message.extend_from_slice(&self.config.info_hash);
        message.extend_from_slice(&self.config.peer_id);

        stream.write_all(&message).await?;
        debug!("sent handshake");

        let mut response = [0u8; 68];
        timeout(self.config.message_timeout, stream.read_exact(&mut response))
            .await
            .map_err(|_| PeerError::Timeout)??;

        if response[1..20] != PROTOCOL[..] {
            return Err(PeerError::HandshakeProtocolMismatch);
        }
        if response[28..48] != self.config.info_hash {
            return Err(PeerError::HandshakeInfoHashMismatch);
        }

        let mut remote_id = [0u8; 20];
        remote_id.copy_from_slice(&response[48..68]);
        self.remote_peer_id = Some(remote_id);
        debug!("handshake complete");
        Ok(())
    }

    pub async fn send_message(&mut self, message: &Message) -> PeerResult<()> {
        let stream = self.stream.as_mut().expect("connect sets stream");
        stream.write_all(&message.to_bytes()).await?;
        Ok(())
    }

    pub async fn receive_message(&mut self) -> PeerResult<Message> {
        let stream = self.stream.as_mut().expect("connect sets stream");

        let mut len_bytes = [0u8; 4];
        timeout(self.config.message_timeout, stream.read_exact(&mut len_bytes))
            .await
            .map_err(|_| PeerError::Timeout)??;
        let len = u32::from_be_bytes(len_bytes);

        if len == 0 {
            return Ok(Message::KeepAlive);
        }

        let mut body = vec![0u8; len as usize];
        timeout(self.config.message_timeout, stream.read_exact(&mut body))
            .await
            .map_err(|_| PeerError::Timeout)??;

        Ok(Message::from_id_and_payload(&body)?)
    }

    /// Receives messages until one matching `predicate` arrives, discarding
    /// keep-alives and anything else seen along the way.
    async fn wait_for(
        &mut self,
        what: &'static str,
        predicate: impl Fn(&Message) -> bool,
    ) -> PeerResult<Message> {
        loop {
            let message = self.receive_message().await?;
            if predicate(&message) {
                return Ok(message);
            }
            debug!(?message, waiting_for = what, "discarding unrelated message");
        }
    }

    /// Downloads one piece: sends `Interested`, waits for `Unchoke`, then
    /// requests every 16 KiB block in order and verifies the assembled
    /// piece against `expected_hash`.
    pub async fn download_piece(
        &mut self,
        piece_index: usize,
        piece_length: u64,
        expected_hash: Option<&[u8; 20]>,
    ) -> PeerResult<Vec<u8>> {
        self.send_message(&Message::Interested).await?;
        self.wait_for("unchoke", |m| matches!(m, Message::Unchoke))
            .await?;

        let mut piece_data = Vec::with_capacity(piece_length as usize);
        let mut offset = 0u32;
        while (offset as u64) < piece_length {
            let remaining = piece_length - offset as u64;
            let block_len = remaining.min(BLOCK_SIZE as u64) as u32;

            self.send_message(&Message::Request {
                index: piece_index as u32,
                begin: offset,
                length: block_len,
            })
            .await?;

            let message = self
                .wait_for("piece", |m| matches!(m, Message::Piece { .. }))
                .await?;
            let Message::Piece { index, begin, block } = message else {
                unreachable!("wait_for guarantees Message::Piece")
            };
            if index as usize != piece_index || begin != offset {
                return Err(PeerError::UnexpectedPiece {
                    want_index: piece_index as u32,
                    want_begin: offset,
                    got_index: index,
                    got_begin: begin,
                });
            }

            piece_data.extend_from_slice(&block);
            offset += block_len;
        }

        if let Some(expected) = expected_hash {
            let mut hasher = Sha1::new();
            hasher.update(&piece_data);
            let digest: [u8; 20] = hasher.finalize().into();
            if &digest != expected {
                return Err(PeerError::PieceHashMismatch { index: piece_index });
            }
        }

        Ok(piece_data)
    }
}
