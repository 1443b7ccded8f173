//! Nonce construction from packet metadata.

use crate::types::{BLOCK_SIZE, NONCE_SIZE};

/// Build the 13-byte nonce shared by the channel and direct paths.
///
/// Layout (all little-endian):
/// - \[0..4\]   packet id
/// - \[4..8\]   extra nonce (0 on the channel path)
/// - \[8..12\]  sender node id
/// - \[12\]     reserved, always zero
pub fn build_nonce(packet_id: u32, node_id: u32, extra_nonce: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..4].copy_from_slice(&packet_id.to_le_bytes());
    nonce[4..8].copy_from_slice(&extra_nonce.to_le_bytes());
    nonce[8..12].copy_from_slice(&node_id.to_le_bytes());
    nonce
}

/// Initial AES-CTR counter block for channel traffic.
///
/// The channel nonce (no extra nonce) padded with zero bytes, so the
/// trailing bytes act as the block counter.
pub fn channel_counter_block(packet_id: u32, sender_id: u32) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..NONCE_SIZE].copy_from_slice(&build_nonce(packet_id, sender_id, 0));
    block
}
