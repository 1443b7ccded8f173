//! Type definitions and protocol constants for Meshtastic packet decoding.

use thiserror::Error;

/// Size of a CCM nonce as used by the mesh protocol.
pub const NONCE_SIZE: usize = 13;

/// Size of the truncated CCM tag appended to direct messages.
pub const TAG_SIZE: usize = 8;

/// Size of the extra nonce appended after the tag.
pub const EXTRA_NONCE_SIZE: usize = 4;

/// Size of the trailer (`mac || extraNonce`) on a direct payload.
pub const DIRECT_TRAILER_SIZE: usize = TAG_SIZE + EXTRA_NONCE_SIZE;

/// Size of an X25519 key in bytes.
pub const CURVE_KEY_SIZE: usize = 32;

/// Size of a block of the underlying block cipher.
pub const BLOCK_SIZE: usize = 16;

/// Channel identifier the MQTT bridge uses for direct (PKI) packets.
pub const PKI_CHANNEL_ID: &str = "PKI";

/// Well-known default channel key that the one-byte PSK shorthand expands to.
pub const DEFAULT_CHANNEL_KEY: [u8; 16] = [
    0xd4, 0xf1, 0xbb, 0x3a, 0x20, 0x29, 0x07, 0x59, 0xf0, 0xbc, 0xff, 0xab, 0xcf, 0x4e, 0x69,
    0x01,
];

/// Errors produced by the CCM engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CcmError {
    /// Tag size, nonce size or cipher key rejected at construction.
    #[error("ccm: invalid parameters: {0}")]
    InvalidParameters(String),

    /// Nonce, tag, ciphertext or AAD of the wrong shape.
    #[error("ccm: invalid input: {0}")]
    InvalidInput(String),

    /// The computed tag does not match the supplied one.
    #[error("ccm: authentication failed")]
    AuthenticationFailed,
}

/// Errors that can occur while decoding a mesh packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet carries neither a decoded nor an encrypted payload.
    #[error("Unknown payload variant")]
    UnknownPayloadVariant,

    /// No key configured for a channel or node address.
    #[error("Key not found for identifier: {0}")]
    KeyNotFound(String),

    /// Direct payload too short to hold ciphertext plus trailer.
    #[error("Invalid trailer length: {0} bytes (need more than {DIRECT_TRAILER_SIZE})")]
    InvalidTrailerLength(usize),

    /// X25519 produced a non-contributory (low-order) shared secret.
    #[error("Key agreement failed")]
    KeyAgreementFailed,

    /// Decryption or authentication failed.
    #[error("Unable to decrypt payload")]
    DecryptFailed,

    /// Cipher-level decryption succeeded but the plaintext is not a valid message.
    #[error("Malformed plaintext: {0}")]
    MalformedPlaintext(String),

    /// Configuration could not be turned into a keyring.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DecodeError {
    /// Collapse every failure that could act as a decryption oracle into
    /// [`DecodeError::DecryptFailed`].
    ///
    /// Lookup misses, short trailers, bad points and tag mismatches must look
    /// identical to callers; the detailed error is only for logs.
    pub fn conceal(self) -> Self {
        match self {
            DecodeError::KeyNotFound(_)
            | DecodeError::InvalidTrailerLength(_)
            | DecodeError::KeyAgreementFailed
            | DecodeError::DecryptFailed => DecodeError::DecryptFailed,
            other => other,
        }
    }
}

impl From<CcmError> for DecodeError {
    fn from(_: CcmError) -> Self {
        DecodeError::DecryptFailed
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conceal_collapses_oracle_errors() {
        let hidden = [
            DecodeError::KeyNotFound("!1234".into()),
            DecodeError::InvalidTrailerLength(3),
            DecodeError::KeyAgreementFailed,
            DecodeError::DecryptFailed,
        ];
        for err in hidden {
            assert_eq!(err.conceal(), DecodeError::DecryptFailed);
        }
    }

    #[test]
    fn test_conceal_keeps_distinct_outcomes() {
        assert_eq!(
            DecodeError::UnknownPayloadVariant.conceal(),
            DecodeError::UnknownPayloadVariant
        );
        assert!(matches!(
            DecodeError::MalformedPlaintext("bad wire type".into()).conceal(),
            DecodeError::MalformedPlaintext(_)
        ));
    }

    #[test]
    fn test_ccm_errors_map_to_decrypt_failed() {
        let err: DecodeError = CcmError::AuthenticationFailed.into();
        assert_eq!(err, DecodeError::DecryptFailed);
    }
}
