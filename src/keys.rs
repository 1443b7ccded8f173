//! Key agreement and key material for direct (PKI) messages.

use std::fmt;

use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::types::{DecodeError, Result, CURVE_KEY_SIZE};

/// Symmetric key derived from an X25519 exchange; wiped on drop.
pub type SharedKey = Zeroizing<[u8; 32]>;

/// An X25519 private key held in the keyring.
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Wrap 32 raw private key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Build a private key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; CURVE_KEY_SIZE] = bytes.try_into().map_err(|_| {
            DecodeError::Config(format!(
                "private key must be {} bytes, got {}",
                CURVE_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(array))
    }

    /// Generate a random private key.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// The matching public key.
    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.0).to_bytes()
    }

    /// Raw private key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the symmetric key shared with the holder of `remote_public`.
    pub fn shared_key(&self, remote_public: &[u8; 32]) -> Result<SharedKey> {
        let shared = self.0.diffie_hellman(&PublicKey::from(*remote_public));
        if !shared.was_contributory() {
            return Err(DecodeError::KeyAgreementFailed);
        }

        let digest = Sha256::digest(shared.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest);
        Ok(key)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&"<redacted>").finish()
    }
}

/// Compute the CCM key for a direct message.
///
/// X25519(local_private, remote_public), hashed with SHA-256.
///
/// # Errors
/// `KeyAgreementFailed` if the remote point is low-order (the raw shared
/// secret would be all zeros).
pub fn derive_shared_key(local_private: &[u8; 32], remote_public: &[u8; 32]) -> Result<SharedKey> {
    PrivateKey::from_bytes(*local_private).shared_key(remote_public)
}

/// Derive an X25519 public key from a private key (scalar times base point).
pub fn public_from_private(private: &[u8; 32]) -> [u8; 32] {
    PrivateKey::from_bytes(*private).public_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_PRIVATE: [u8; 32] = [1u8; 32];
    const ALICE_PUBLIC_HEX: &str =
        "a4e09292b651c278b9772c569f5fa9bb13d906b46ab68c9df9dc2b4409f8a209";
    const BOB_PRIVATE: [u8; 32] = [2u8; 32];
    const BOB_PUBLIC_HEX: &str =
        "ce8d3ad1ccb633ec7b70c17814a5c76ecd029685050d344745ba05870e587d59";
    const SHARED_KEY_HEX: &str =
        "6defcae708a9595ae58d716ac650df5a0ee3d8b329e6d54d03571c87a96fda5f";

    #[test]
    fn test_public_from_private() {
        assert_eq!(hex::encode(public_from_private(&ALICE_PRIVATE)), ALICE_PUBLIC_HEX);
        assert_eq!(hex::encode(public_from_private(&BOB_PRIVATE)), BOB_PUBLIC_HEX);
    }

    #[test]
    fn test_shared_key_vector() {
        let bob_public = public_from_private(&BOB_PRIVATE);
        let key = derive_shared_key(&ALICE_PRIVATE, &bob_public).unwrap();
        assert_eq!(hex::encode(*key), SHARED_KEY_HEX);
    }

    #[test]
    fn test_shared_key_is_symmetric() {
        let alice = PrivateKey::generate();
        let bob = PrivateKey::generate();

        let ab = alice.shared_key(&bob.public_key()).unwrap();
        let ba = bob.shared_key(&alice.public_key()).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_low_order_point_rejected() {
        // u = 0 and u = 1 are small-order points: clamped scalars map them to zero.
        let mut order_four = [0u8; 32];
        order_four[0] = 1;
        for point in [[0u8; 32], order_four] {
            assert!(matches!(
                derive_shared_key(&ALICE_PRIVATE, &point),
                Err(DecodeError::KeyAgreementFailed)
            ));
        }
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(matches!(
            PrivateKey::from_slice(&[0u8; 31]),
            Err(DecodeError::Config(_))
        ));
        let key = PrivateKey::from_slice(&ALICE_PRIVATE).unwrap();
        assert_eq!(hex::encode(key.public_key()), ALICE_PUBLIC_HEX);
    }

    #[test]
    fn test_debug_redacts() {
        let key = PrivateKey::from_bytes(ALICE_PRIVATE);
        assert_eq!(format!("{:?}", key), "PrivateKey(\"<redacted>\")");
    }
}
