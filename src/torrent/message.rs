//! Peer wire protocol messages.
//!
//! Every message after the handshake is framed as a 4-byte big-endian
//! length prefix followed by that many bytes: a 1-byte message id and an
//! id-specific payload. A length of zero with no id is a keep-alive.

use thiserror::Error;

const ID_CHOKE: u8 = 0;
const ID_UNCHOKE: u8 = 1;
const ID_INTERESTED: u8 = 2;
const ID_NOT_INTERESTED: u8 = 3;
const ID_HAVE: u8 = 4;
const ID_BITFIELD: u8 = 5;
const ID_REQUEST: u8 = 6;
const ID_PIECE: u8 = 7;
const ID_CANCEL: u8 = 8;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message payload too short for id {id}: got {len} bytes")]
    PayloadTooShort { id: u8, len: usize },

    #[error("unknown message id {0}")]
    UnknownId(u8),
}

pub type MessageResult<T> = std::result::Result<T, MessageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Encodes this message, including its 4-byte length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::KeepAlive => {
                out.extend_from_slice(&0u32.to_be_bytes());
            }
            Message::Choke => write_framed(&mut out, ID_CHOKE, &[]),
            Message::Unchoke => write_framed(&mut out, ID_UNCHOKE, &[]),
            Message::Interested => write_framed(&mut out, ID_INTERESTED, &[]),
            Message::NotInterested => write_framed(&mut out, ID_NOT_INTERESTED, &[]),
            Message::Have(index) => write_framed(&mut out, ID_HAVE, &index.to_be_bytes()),
            Message::Bitfield(bits) => write_framed(&mut out, ID_BITFIELD, bits),
            Message::Request { index, begin, length } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(&length.to_be_bytes());
                write_framed(&mut out, ID_REQUEST, &payload);
            }
            Message::Piece { index, begin, block } => {
                let mut payload = Vec::with_capacity(8 + block.len());
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(block);
                write_framed(&mut out, ID_PIECE, &payload);
            }
            Message::Cancel { index, begin, length } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(&length.to_be_bytes());
                write_framed(&mut out, ID_CANCEL, &payload);
            }
        }
        out
    }

    /// Parses a single message body (the id byte plus payload, i.e. the
    /// bytes that followed the 4-byte length prefix). An empty slice is a
    /// keep-alive.
    pub fn from_id_and_payload(body: &[u8]) -> MessageResult<Self> {
        let Some((&id, payload)) = body.split_first() else {
            return Ok(Message::KeepAlive);
        };
        match id {
            ID_CHOKE => Ok(Message::Choke),
            ID_UNCHOKE => Ok(Message::Unchoke),
            ID_INTERESTED => Ok(Message::Interested),
            ID_NOT_INTERESTED => Ok(Message::NotInterested),
            ID_HAVE => {
                let index = read_u32(id, payload, 0)?;
                Ok(Message::Have(index))
            }
            ID_BITFIELD => Ok(Message::Bitfield(payload.to_vec())),
            ID_REQUEST => {
                let index = read_u32(id, payload, 0)?;
                let begin = read_u32(id, payload, 4)?;
                let length = read_u32(id, payload, 8)?;
                Ok(Message::Request { index, begin, length })
            }
            ID_PIECE => {
                if payload.len() < 8 {
                    return Err(MessageError::PayloadTooShort { id, len: payload.len() });
                }
                let index = read_u32(id, payload, 0)?;
                let begin = read_u32(id, payload, 4)?;
                let block = payload[8..].to_vec();
                Ok(Message::Piece { index, begin, block })
            }
            ID_CANCEL => {
                let index = read_u32(id, payload, 0)?;
                let begin = read_u32(id, payload, 4)?;
                let length = read_u32(id, payload, 8)?;
                Ok(Message::Cancel { index, begin, length })
            }
            other => Err(MessageError::UnknownId(other)),
        }
    }
}

fn write_framed(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    let len = 1 + payload.len() as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.push(id);
    out.extend_from_slice(payload);
}

fn read_u32(id: u8, payload: &[u8], offset: usize) -> MessageResult<u32> {
    payload
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
        .ok_or(MessageError::PayloadTooShort { id, len: payload.len() })
}
