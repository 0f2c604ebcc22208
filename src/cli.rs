use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line arguments for the minimal BitTorrent client.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded string and print it as JSON.
    Decode {
        /// The bencoded string to decode.
        input: String,
    },
    /// Print a torrent file's tracker URL, length, info hash, piece length,
    /// and piece hashes.
    Info {
        /// Path to the `.torrent` file.
        path: PathBuf,
    },
    /// Announce to the tracker and print each peer as `ip:port`.
    Peers {
        /// Path to the `.torrent` file.
        path: PathBuf,
    },
    /// Perform a handshake with a single peer and print its peer id.
    Handshake {
        /// Path to the `.torrent` file.
        path: PathBuf,
        /// Peer address as `ip:port`.
        peer: String,
    },
    /// Download a single piece and write it to `--output`.
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Path to write the downloaded piece to.
        #[arg(short, long)]
        output: PathBuf,
        /// Path to the `.torrent` file.
        path: PathBuf,
        /// Index of the piece to download.
        piece_index: usize,
    },
    /// Download the entire file and write it to `--output`.
    Download {
        /// Path to write the downloaded file to.
        #[arg(short, long)]
        output: PathBuf,
        /// Path to the `.torrent` file.
        path: PathBuf,
    },
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
