//! Download coordination: fans piece downloads out across the swarm with
//! bounded concurrency and fails fast.
//!
//! Each piece gets a fresh peer connection, assigned round-robin over the
//! tracker's peer list (`peers[i % peers.len()]`). There is no retry across
//! peers and no peer failover: the first piece that errors aborts every
//! other in-flight session and the whole download fails. This keeps the
//! coordinator's behavior simple to reason about, at the cost of
//! robustness against a single flaky peer — acceptable for a minimal
//! client talking to a small swarm.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::torrent::metainfo::TorrentMetainfo;
use crate::torrent::peer::{Peer, PeerConfig, PeerError, PeerId};
use crate::torrent::tracker::{self, PeerAddr, TrackerConfig, TrackerError};

pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("tracker returned no peers")]
    NoPeers,

    #[error("piece index {index} out of range: torrent has {piece_count} pieces")]
    PieceIndexOutOfRange { index: usize, piece_count: usize },

    #[error("peer session failed for piece {index}: {source}")]
    Peer { index: usize, source: PeerError },

    #[error("failed to write output file: {0}")]
    Io(#[from] std::io::Error),
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub peer_id: PeerId,
    pub listen_port: u16,
    pub concurrency: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            peer_id: [0u8; 20],
            listen_port: 6881,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct Downloader {
    torrent: TorrentMetainfo,
    peers: Vec<PeerAddr>,
    config: DownloadConfig,
}

impl Downloader {
    /// Announces to the tracker and builds a coordinator over the returned
    /// peer list.
    pub async fn new(torrent: TorrentMetainfo, config: DownloadConfig) -> DownloadResult<Self> {
        let info_hash = torrent.info_hash();
        let tracker_config = TrackerConfig {
            peer_id: config.peer_id,
            port: config.listen_port,
            compact: true,
        };
        let peers = tracker::get_peers(
            &torrent.announce,
            info_hash,
            torrent.info.length,
            &tracker_config,
        )
        .await?;

        if peers.is_empty() {
            return Err(DownloadError::NoPeers);
        }

        info!(count = peers.len(), "tracker returned peers");
        Ok(Self { torrent, peers, config })
    }

    /// Builds a coordinator over a peer list the caller already has (e.g.
    /// from the `peers` subcommand), without contacting the tracker again.
    pub fn from_peers(torrent: TorrentMetainfo, peers: Vec<PeerAddr>, config: DownloadConfig) -> Self {
        Self { torrent, peers, config }
    }

    fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            peer_id: self.config.peer_id,
            info_hash: self.torrent.info_hash(),
            ..Default::default()
        }
    }

    fn peer_for_piece(&self, piece_index: usize) -> PeerAddr {
        self.peers[piece_index % self.peers.len()]
    }

    /// Downloads a single piece from a fresh session with the peer assigned
    /// to it by `piece_index % peers.len()`, and verifies its hash.
    pub async fn download_piece(&self, piece_index: usize) -> DownloadResult<Vec<u8>> {
        let piece_count = self.torrent.info.piece_count();
        if piece_index >= piece_count {
            return Err(DownloadError::PieceIndexOutOfRange { index: piece_index, piece_count });
        }

        let addr = self.peer_for_piece(piece_index);
        let peer_config = self.peer_config();
        let piece_length = self.torrent.info.piece_size(piece_index);
        let expected_hash = piece_hash(&self.torrent, piece_index);

        download_one_piece(addr, peer_config, piece_index, piece_length, expected_hash)
            .await
            .map_err(|source| DownloadError::Peer { index: piece_index, source })
    }

    /// Downloads every piece with up to `config.concurrency` sessions in
    /// flight at once, reassembles them in order, and writes the result to
    /// `output`. The first piece to fail cancels every other in-flight
    /// session and the error propagates immediately.
    pub async fn download_all(&self, output: &std::path::Path) -> DownloadResult<()> {
        let total_pieces = self.torrent.info.piece_count();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut pieces: Vec<Option<Vec<u8>>> = vec![None; total_pieces];
        let mut join_set = JoinSet::new();

        for piece_index in 0..total_pieces {
            let addr = self.peer_for_piece(piece_index);
            let peer_config = self.peer_config();
            let piece_length = self.torrent.info.piece_size(piece_index);
            let expected_hash = piece_hash(&self.torrent, piece_index);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let result =
                    download_one_piece(addr, peer_config, piece_index, piece_length, expected_hash)
                        .await;
                (piece_index, result)
            });
        }

        let mut first_error: Option<DownloadError> = None;
        while let Some(joined) = join_set.join_next().await {
            let (piece_index, result) = joined.expect("piece download task panicked");
            match result {
                Ok(data) => {
                    info!(piece_index, total_pieces, "piece verified");
                    pieces[piece_index] = Some(data);
                }
                Err(source) => {
                    warn!(piece_index, %source, "piece download failed, aborting remaining work");
                    first_error.get_or_insert(DownloadError::Peer { index: piece_index, source });
                    join_set.abort_all();
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let mut file_data = Vec::with_capacity(self.torrent.info.length as usize);
        for piece in pieces {
            file_data.extend_from_slice(&piece.expect("every piece verified before this point"));
        }
        tokio::fs::write(output, file_data).await?;
        info!(path = %output.display(), "download complete");
        Ok(())
    }
}

async fn download_one_piece(
    addr: PeerAddr,
    peer_config: PeerConfig,
    piece_index: usize,
    piece_length: u64,
    expected_hash: [u8; 20],
) -> Result<Vec<u8>, PeerError> {
    let mut peer = Peer::new(
        std::net::SocketAddr::new(std::net::IpAddr::V4(addr.ip), addr.port),
        peer_config,
    );
    peer.connect().await?;
    peer.download_piece(piece_index, piece_length, Some(&expected_hash))
        .await
}

fn piece_hash(torrent: &TorrentMetainfo, piece_index: usize) -> [u8; 20] {
    let start = piece_index * 20;
    torrent.info.pieces[start..start + 20]
        .try_into()
        .expect("pieces field length is validated to be a multiple of 20")
}
