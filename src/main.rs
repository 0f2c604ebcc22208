use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod bencode;
pub mod cli;
pub mod torrent;
pub mod utils;

use bencode::BValue;
use torrent::download::{DownloadConfig, Downloader};
use torrent::metainfo::TorrentMetainfo;
use torrent::peer::{Peer, PeerConfig};
use torrent::tracker::{self, TrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();
    let peer_id = utils::generate_peer_id();

    match args.command {
        cli::Command::Decode { input } => decode(&input)?,
        cli::Command::Info { path } => info_cmd(&path)?,
        cli::Command::Peers { path } => peers_cmd(&path, peer_id).await?,
        cli::Command::Handshake { path, peer } => handshake_cmd(&path, &peer, peer_id).await?,
        cli::Command::DownloadPiece { output, path, piece_index } => {
            download_piece_cmd(&output, &path, piece_index, peer_id).await?
        }
        cli::Command::Download { output, path } => download_cmd(&output, &path, peer_id).await?,
    }

    Ok(())
}

fn decode(input: &str) -> Result<()> {
    let value = BValue::decode(input.as_bytes()).context("decoding bencoded input")?;
    println!("{value}");
    Ok(())
}

fn load_torrent(path: &Path) -> Result<TorrentMetainfo> {
    TorrentMetainfo::from_file(path).with_context(|| format!("reading torrent file {}", path.display()))
}

fn info_cmd(path: &Path) -> Result<()> {
    let torrent = load_torrent(path)?;
    println!("Tracker URL: {}", torrent.announce);
    println!("Length: {}", torrent.info.length);
    println!("Info Hash: {}", hex::encode(torrent.info_hash()));
    println!("Piece Length: {}", torrent.info.piece_length);
    println!("Piece Hashes:");
    for hash in torrent.info.piece_hashes() {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}

async fn peers_cmd(path: &Path, peer_id: torrent::peer::PeerId) -> Result<()> {
    let torrent = load_torrent(path)?;
    let config = TrackerConfig { peer_id, ..Default::default() };
    let peers = tracker::get_peers(&torrent.announce, torrent.info_hash(), torrent.info.length, &config)
        .await
        .context("announcing to tracker")?;
    for peer in peers {
        println!("{peer}");
    }
    Ok(())
}

async fn handshake_cmd(path: &Path, peer_addr: &str, peer_id: torrent::peer::PeerId) -> Result<()> {
    let torrent = load_torrent(path)?;
    let config = PeerConfig { peer_id, info_hash: torrent.info_hash(), ..Default::default() };

    let mut peer = Peer::new(peer_addr.parse().context("parsing peer address")?, config);
    peer.connect().await.context("connecting to peer")?;
    let remote_id = peer.remote_peer_id.expect("connect() populates remote_peer_id on success");
    println!("Peer ID: {}", hex::encode(remote_id));
    Ok(())
}

async fn download_piece_cmd(
    output: &Path,
    path: &Path,
    piece_index: usize,
    peer_id: torrent::peer::PeerId,
) -> Result<()> {
    let torrent = load_torrent(path)?;
    let config = DownloadConfig { peer_id, ..Default::default() };
    let downloader = Downloader::new(torrent, config).await?;
    let piece_data = downloader.download_piece(piece_index).await?;

    tokio::fs::write(output, piece_data).await?;
    info!(piece_index, path = %output.display(), "piece downloaded and verified");
    Ok(())
}

async fn download_cmd(output: &PathBuf, path: &Path, peer_id: torrent::peer::PeerId) -> Result<()> {
    let torrent = load_torrent(path)?;
    let config = DownloadConfig { peer_id, ..Default::default() };
    let downloader = Downloader::new(torrent, config).await?;
    downloader.download_all(output).await?;
    Ok(())
}
