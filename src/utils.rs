use rand::Rng;

use crate::torrent::peer::PeerId;

const PEER_ID_PREFIX: &[u8; 8] = b"-MB0100-";

/// Generates an Azureus-style peer id: an 8-byte client identifier prefix
/// followed by 12 random bytes.
pub fn generate_peer_id() -> PeerId {
    let mut id = [0u8; 20];
    id[..8].copy_from_slice(PEER_ID_PREFIX);
    rand::thread_rng().fill(&mut id[8..]);
    id
}
