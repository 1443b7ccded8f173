//! Encryption and decryption for channel and direct mesh packets.
//!
//! Channel packets use AES-CTR under the channel's pre-shared key. That path
//! has NO integrity protection: a wrong key or a flipped bit still "decrypts",
//! and only the protobuf parse that follows can notice the garbage.
//!
//! Direct (PKI) packets use AES-CCM with an 8-byte tag under
//! SHA-256(X25519(local private, remote public)).

use std::fmt;

use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::ccm::Ccm;
use crate::envelope::DirectTrailer;
use crate::keys::PrivateKey;
use crate::nonce::{build_nonce, channel_counter_block};
use crate::types::{DecodeError, Result, DEFAULT_CHANNEL_KEY, EXTRA_NONCE_SIZE};

/// Channel cipher: the whole 16-byte IV block counts as a big-endian counter.
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// An expanded channel key.
///
/// Empty means the channel is not encrypted; otherwise 16 (AES-128) or
/// 32 (AES-256) bytes.
#[derive(Clone)]
pub struct ChannelKey(Zeroizing<Vec<u8>>);

impl ChannelKey {
    /// Expand a configured pre-shared key.
    ///
    /// - 0 bytes, or the single byte `0`: no encryption
    /// - 1 byte `n`: the default key with its last byte bumped by `n - 1`
    /// - 16 or 32 bytes: used as-is
    pub fn from_psk(psk: &[u8]) -> Result<Self> {
        match psk.len() {
            0 => Ok(Self(Zeroizing::new(Vec::new()))),
            1 if psk[0] == 0 => Ok(Self(Zeroizing::new(Vec::new()))),
            1 => {
                let mut key = DEFAULT_CHANNEL_KEY.to_vec();
                if let Some(last) = key.last_mut() {
                    *last = last.wrapping_add(psk[0] - 1);
                }
                Ok(Self(Zeroizing::new(key)))
            }
            16 | 32 => Ok(Self(Zeroizing::new(psk.to_vec()))),
            n => Err(DecodeError::Config(format!(
                "channel key must be 0, 1, 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// Whether packets on this channel are sent in the clear.
    pub fn is_plaintext(&self) -> bool {
        self.0.is_empty()
    }

    /// The expanded key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelKey")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Decrypt a channel packet.
///
/// Unauthenticated: any input yields some output of the same length.
pub fn open_channel(
    key: &ChannelKey,
    packet_id: u32,
    sender_id: u32,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let mut data = ciphertext.to_vec();
    if key.is_plaintext() {
        return Ok(data);
    }

    let iv = channel_counter_block(packet_id, sender_id);
    match key.as_bytes().len() {
        16 => Aes128Ctr::new_from_slices(key.as_bytes(), &iv)
            .map_err(|_| DecodeError::DecryptFailed)?
            .apply_keystream(&mut data),
        32 => Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
            .map_err(|_| DecodeError::DecryptFailed)?
            .apply_keystream(&mut data),
        _ => return Err(DecodeError::DecryptFailed),
    }

    Ok(data)
}

/// Encrypt a channel packet. CTR mode is its own inverse.
pub fn seal_channel(
    key: &ChannelKey,
    packet_id: u32,
    sender_id: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    open_channel(key, packet_id, sender_id, plaintext)
}

/// Channel hash carried in mesh packets: XOR of the name bytes and the key bytes.
pub fn channel_hash(name: &str, key: &ChannelKey) -> u8 {
    let xor = |bytes: &[u8]| bytes.iter().fold(0u8, |acc, b| acc ^ b);
    xor(name.as_bytes()) ^ xor(key.as_bytes())
}

/// Decrypt and authenticate a direct packet.
///
/// # Arguments
/// * `packet_id` - Packet id from the mesh header
/// * `sender_id` - Node id of the sender (goes into the nonce)
/// * `local_private` - Our X25519 private key
/// * `remote_public` - The sender's X25519 public key
/// * `trailer` - The payload split into ciphertext, tag and extra nonce
pub fn open_direct(
    packet_id: u32,
    sender_id: u32,
    local_private: &PrivateKey,
    remote_public: &[u8; 32],
    trailer: &DirectTrailer<'_>,
) -> Result<Vec<u8>> {
    let key = local_private.shared_key(remote_public)?;
    let nonce = build_nonce(packet_id, sender_id, trailer.extra_nonce);

    let ccm = Ccm::for_mesh(key.as_slice())?;
    Ok(ccm.open(&nonce, trailer.ciphertext, &trailer.mac, &[])?)
}

/// Encrypt a direct packet with a fresh random extra nonce.
///
/// # Returns
/// `ciphertext || tag (8) || extraNonce (4, little-endian)`
pub fn seal_direct(
    packet_id: u32,
    sender_id: u32,
    local_private: &PrivateKey,
    remote_public: &[u8; 32],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let mut extra_nonce = [0u8; EXTRA_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut extra_nonce);

    seal_direct_with_nonce(
        packet_id,
        sender_id,
        local_private,
        remote_public,
        plaintext,
        u32::from_le_bytes(extra_nonce),
    )
}

/// Encrypt a direct packet with a caller-chosen extra nonce.
pub fn seal_direct_with_nonce(
    packet_id: u32,
    sender_id: u32,
    local_private: &PrivateKey,
    remote_public: &[u8; 32],
    plaintext: &[u8],
    extra_nonce: u32,
) -> Result<Vec<u8>> {
    let key = local_private.shared_key(remote_public)?;
    let nonce = build_nonce(packet_id, sender_id, extra_nonce);

    let ccm = Ccm::for_mesh(key.as_slice())?;
    let mut sealed = ccm.seal(&nonce, plaintext, &[])?;
    sealed.extend_from_slice(&extra_nonce.to_le_bytes());
    Ok(sealed)
}
