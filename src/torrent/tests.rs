//! Integration tests for the peer wire protocol and piece download.
//!
//! `MockPeer` wraps a `TcpListener` bound to an ephemeral port and runs a
//! handler closure against the accepted connection, standing in for a real
//! BitTorrent peer without any network dependency.

use super::*;
use crate::bencode::BValue;
use message::Message;
use peer::{Peer, PeerConfig};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

struct MockPeer {
    listener: TcpListener,
}

impl MockPeer {
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        debug!(addr = %listener.local_addr().unwrap(), "mock peer listening");
        Self { listener }
    }

    fn addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr().unwrap()
    }

    async fn handle_connection<F, Fut>(self, handler: F)
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let (stream, _) = self.listener.accept().await.unwrap();
            handler(stream).await;
        });
    }
}

async fn respond_to_handshake(stream: &mut TcpStream) {
    let mut handshake = [0u8; 68];
    stream.read_exact(&mut handshake).await.unwrap();
    assert_eq!(&handshake[1..20], b"BitTorrent protocol");
    stream.write_all(&handshake).await.unwrap();
}

async fn serve_one_piece(mut stream: TcpStream, piece_byte: u8, piece_len: usize) {
    respond_to_handshake(&mut stream).await;

    stream
        .write_all(&Message::Bitfield(vec![0xFF]).to_bytes())
        .await
        .unwrap();

    let mut msg_len = [0u8; 4];
    stream.read_exact(&mut msg_len).await.unwrap();
    let mut msg_type = [0u8];
    stream.read_exact(&mut msg_type).await.unwrap();
    assert_eq!(msg_type[0], 2); // Interested

    stream.write_all(&Message::Unchoke.to_bytes()).await.unwrap();

    let piece_data = vec![piece_byte; piece_len];
    loop {
        let mut header = [0u8; 4];
        if stream.read_exact(&mut header).await.is_err() {
            break;
        }
        let mut msg_type = [0u8];
        stream.read_exact(&mut msg_type).await.unwrap();
        if msg_type[0] == 6 {
            let mut request = [0u8; 12];
            stream.read_exact(&mut request).await.unwrap();
            let begin = u32::from_be_bytes(request[4..8].try_into().unwrap()) as usize;
            let length = u32::from_be_bytes(request[8..12].try_into().unwrap()) as usize;
            let block = piece_data[begin..begin + length].to_vec();
            let response = Message::Piece { index: 0, begin: begin as u32, block }.to_bytes();
            stream.write_all(&response).await.unwrap();
        }
    }
}

#[tokio::test]
async fn downloads_and_verifies_a_single_piece() {
    let mock_peer = MockPeer::new().await;
    let addr = mock_peer.addr();
    mock_peer
        .handle_connection(move |stream| serve_one_piece(stream, 42, 16384))
        .await;

    let config = PeerConfig::default();
    let mut peer = Peer::new(addr, config);
    peer.connect().await.unwrap();

    let mut hasher = Sha1::new();
    hasher.update(vec![42u8; 16384]);
    let expected_hash: [u8; 20] = hasher.finalize().into();

    let piece = peer.download_piece(0, 16384, Some(&expected_hash)).await.unwrap();
    assert_eq!(piece.len(), 16384);
    assert!(piece.iter().all(|&b| b == 42));
}

#[tokio::test]
async fn piece_failing_hash_verification_is_rejected() {
    let mock_peer = MockPeer::new().await;
    let addr = mock_peer.addr();
    mock_peer
        .handle_connection(move |stream| serve_one_piece(stream, 7, 16384))
        .await;

    let mut peer = Peer::new(addr, PeerConfig::default());
    peer.connect().await.unwrap();

    let wrong_hash = [0u8; 20];
    let result = peer.download_piece(0, 16384, Some(&wrong_hash)).await;
    assert!(matches!(result, Err(peer::PeerError::PieceHashMismatch { index: 0 })));
}

#[tokio::test]
async fn malformed_message_after_handshake_errors() {
    let mock_peer = MockPeer::new().await;
    let addr = mock_peer.addr();
    mock_peer
        .handle_connection(|mut stream| async move {
            respond_to_handshake(&mut stream).await;
            // length=1, id=0xFF: not a known message id.
            stream.write_all(&[0, 0, 0, 1, 0xFF]).await.unwrap();
        })
        .await;

    let mut peer = Peer::new(addr, PeerConfig::default());
    peer.connect().await.unwrap();
    assert!(peer.download_piece(0, 16384, None).await.is_err());
}

#[tokio::test]
async fn connecting_to_an_unreachable_peer_errors() {
    let addr = "10.0.0.1:1234".parse().unwrap();
    let mut config = PeerConfig::default();
    config.connect_timeout = std::time::Duration::from_millis(200);
    let mut peer = Peer::new(addr, config);
    assert!(peer.connect().await.is_err());
}

#[tokio::test]
async fn keep_alive_is_received_as_its_own_message() {
    let mock_peer = MockPeer::new().await;
    let addr = mock_peer.addr();
    mock_peer
        .handle_connection(|mut stream| async move {
            respond_to_handshake(&mut stream).await;
            stream.write_all(&[0, 0, 0, 0]).await.unwrap();
        })
        .await;

    let mut peer = Peer::new(addr, PeerConfig::default());
    peer.connect().await.unwrap();
    assert_eq!(peer.receive_message().await.unwrap(), Message::KeepAlive);
}

#[tokio::test]
async fn download_all_reassembles_pieces_in_order_from_a_multi_peer_swarm() {
    use download::{DownloadConfig, Downloader};
    use metainfo::TorrentMetainfo;
    use tracker::PeerAddr;

    let piece_len = 16384u64;
    let piece_bytes: [u8; 3] = [1, 2, 3];
    let mut peers = Vec::new();
    let mut pieces_field = Vec::new();

    for &b in &piece_bytes {
        let mock_peer = MockPeer::new().await;
        let addr = mock_peer.addr();
        peers.push(PeerAddr {
            ip: match addr.ip() {
                std::net::IpAddr::V4(v4) => v4,
                _ => unreachable!("mock peer always binds an IPv4 loopback address"),
            },
            port: addr.port(),
        });
        mock_peer
            .handle_connection(move |stream| serve_one_piece(stream, b, piece_len as usize))
            .await;

        let mut hasher = Sha1::new();
        hasher.update(vec![b; piece_len as usize]);
        let digest: [u8; 20] = hasher.finalize().into();
        pieces_field.extend_from_slice(&digest);
    }

    let total_length = piece_len * piece_bytes.len() as u64;
    let info = BValue::Dict(
        [
            (b"length".to_vec(), BValue::Integer(total_length as i64)),
            (b"name".to_vec(), BValue::Bytes(b"swarm.bin".to_vec())),
            (b"piece length".to_vec(), BValue::Integer(piece_len as i64)),
            (b"pieces".to_vec(), BValue::Bytes(pieces_field)),
        ]
        .into_iter()
        .collect(),
    );
    let top = BValue::Dict(
        [
            (b"announce".to_vec(), BValue::Bytes(b"http://unused.example/announce".to_vec())),
            (b"info".to_vec(), info),
        ]
        .into_iter()
        .collect(),
    );
    let torrent = TorrentMetainfo::from_bytes(&top.encode()).unwrap();

    let downloader = Downloader::from_peers(torrent, peers, DownloadConfig::default());
    let tmp = tempfile::NamedTempFile::new().unwrap();
    downloader.download_all(tmp.path()).await.unwrap();

    let written = std::fs::read(tmp.path()).unwrap();
    let mut expected = Vec::new();
    for &b in &piece_bytes {
        expected.extend(std::iter::repeat(b).take(piece_len as usize));
    }
    assert_eq!(written, expected);
}
