//! Piece and block layout derived from a torrent's `info` dictionary.
//!
//! For a file of total length `L` split into pieces of length `P`:
//! piece `i` for `0 <= i < n - 1` has length `P`; the final piece has
//! whatever is left over. Each piece is further split into fixed 16 KiB
//! blocks, the unit of the REQUEST/PIECE wire exchange, plus a shorter
//! final block when the piece length isn't a multiple of 16 KiB.

pub const BLOCK_SIZE: u32 = 16 * 1024;

pub fn piece_count(total_length: u64, piece_length: u64) -> usize {
    if piece_length == 0 {
        return 0;
    }
    total_length.div_ceil(piece_length) as usize
}

/// Length of piece `index`, given the total file length and nominal piece length.
pub fn piece_length(total_length: u64, piece_length: u64, index: usize) -> u64 {
    let n = piece_count(total_length, piece_length);
    assert!(index < n, "piece index {index} out of range (n={n})");
    if index < n - 1 {
        piece_length
    } else {
        total_length - piece_length * (n - 1) as u64
    }
}

/// `(offset, length)` for every block within a piece of the given length.
pub fn block_layout(piece_len: u32) -> Vec<(u32, u32)> {
    let mut blocks = Vec::new();
    let mut offset = 0u32;
    while offset < piece_len {
        let remaining = piece_len - offset;
        let len = remaining.min(BLOCK_SIZE);
        blocks.push((offset, len));
        offset += len;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_count_and_lengths_length_100_piece_32() {
        assert_eq!(piece_count(100, 32), 4);
        let lengths: Vec<u64> = (0..4).map(|i| piece_length(100, 32, i)).collect();
        assert_eq!(lengths, vec![32, 32, 32, 4]);
    }

    #[test]
    fn piece_count_and_lengths_length_64_piece_32() {
        assert_eq!(piece_count(64, 32), 2);
        let lengths: Vec<u64> = (0..2).map(|i| piece_length(64, 32, i)).collect();
        assert_eq!(lengths, vec![32, 32]);
    }

    #[test]
    fn block_layout_splits_on_16kib_boundaries() {
        let blocks = block_layout(32 * 1024 + 100);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], (0, 16384));
        assert_eq!(blocks[1], (16384, 16384));
        assert_eq!(blocks[2], (32768, 100));
    }

    #[test]
    fn block_layout_exact_multiple_has_no_short_tail() {
        let blocks = block_layout(32 * 1024);
        assert_eq!(blocks, vec![(0, 16384), (16384, 16384)]);
    }
}
