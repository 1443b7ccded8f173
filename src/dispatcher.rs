//! Packet decoder.
//!
//! Routes each envelope to the passthrough, channel or direct path and
//! returns the recovered protobuf bytes. Callers only ever see concealed
//! errors; the precise reason a packet was dropped goes to the log.

use prost::Message;
use tracing::{debug, warn};

use crate::crypto::{open_channel, open_direct};
use crate::envelope::{DirectTrailer, Envelope, PayloadVariant};
use crate::keyring::{node_address, KeyLookup};
use crate::models::{mesh_packet, Data, MeshPacket};
use crate::types::{DecodeError, Result, PKI_CHANNEL_ID};

/// Which path recovered a packet's plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodePath {
    /// Payload arrived already decoded.
    Passthrough,
    /// AES-CTR under a channel key.
    Channel,
    /// X25519 + AES-CCM between two nodes.
    Direct,
}

impl DecodePath {
    /// Short name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodePath::Passthrough => "passthrough",
            DecodePath::Channel => "channel",
            DecodePath::Direct => "direct",
        }
    }
}

/// Recovered protobuf bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
    pub path: DecodePath,
    pub bytes: Vec<u8>,
}

/// A packet decrypted and parsed into its application payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub path: DecodePath,
    pub data: Data,
}

/// Decoder over a read-only key source.
///
/// Holds no mutable state, so one decoder (or clones of it) can serve any
/// number of threads as long as `K` is `Sync`.
#[derive(Debug, Clone)]
pub struct MeshDecoder<K> {
    keys: K,
}

impl<K: KeyLookup> MeshDecoder<K> {
    /// Create a decoder over the given key source.
    pub fn new(keys: K) -> Self {
        Self { keys }
    }

    /// The key source this decoder reads.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Recover the plaintext protobuf bytes of a packet.
    ///
    /// # Arguments
    /// * `envelope` - Payload plus routing metadata
    ///
    /// # Returns
    /// The plaintext and the path that produced it. Lookup misses, short
    /// trailers, bad points and tag mismatches all surface as
    /// [`DecodeError::DecryptFailed`].
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Plaintext> {
        let result = match &envelope.payload {
            PayloadVariant::Decoded(bytes) => Ok(Plaintext {
                path: DecodePath::Passthrough,
                bytes: bytes.clone(),
            }),
            PayloadVariant::Encrypted(bytes) if envelope.is_direct() => {
                self.decrypt_direct(envelope, bytes).map(|bytes| Plaintext {
                    path: DecodePath::Direct,
                    bytes,
                })
            }
            PayloadVariant::Encrypted(bytes) => {
                self.decrypt_channel(envelope, bytes).map(|bytes| Plaintext {
                    path: DecodePath::Channel,
                    bytes,
                })
            }
            PayloadVariant::Unknown => Err(DecodeError::UnknownPayloadVariant),
        };

        match result {
            Ok(plaintext) => {
                debug!(
                    channel_id = %envelope.channel_id,
                    sender = %node_address(envelope.sender_id),
                    packet_id = envelope.packet_id,
                    path = plaintext.path.as_str(),
                    "packet decrypted"
                );
                Ok(plaintext)
            }
            Err(err) => {
                let len = match &envelope.payload {
                    PayloadVariant::Decoded(bytes) | PayloadVariant::Encrypted(bytes) => {
                        bytes.len()
                    }
                    PayloadVariant::Unknown => 0,
                };
                warn!(
                    channel_id = %envelope.channel_id,
                    sender = %node_address(envelope.sender_id),
                    dest = %node_address(envelope.dest_id),
                    packet_id = envelope.packet_id,
                    len,
                    error = %err,
                    "dropping packet"
                );
                Err(err.conceal())
            }
        }
    }

    /// Decrypt a packet and parse its `Data` payload.
    pub fn decode(&self, envelope: &Envelope) -> Result<DecodedPacket> {
        let plaintext = self.decrypt(envelope)?;

        match Data::decode(plaintext.bytes.as_slice()) {
            Ok(data) => Ok(DecodedPacket {
                path: plaintext.path,
                data,
            }),
            Err(err) => {
                // Cipher succeeded but the bytes are not a message: usually a
                // wrong channel key, since that path has no integrity check.
                warn!(
                    channel_id = %envelope.channel_id,
                    sender = %node_address(envelope.sender_id),
                    packet_id = envelope.packet_id,
                    path = plaintext.path.as_str(),
                    len = plaintext.bytes.len(),
                    error = %err,
                    "decrypted payload is not a Data message"
                );
                Err(DecodeError::MalformedPlaintext(err.to_string()))
            }
        }
    }

    /// Parse an MQTT payload and decode the packet inside it.
    pub fn decode_service_envelope(&self, payload: &[u8]) -> Result<DecodedPacket> {
        let envelope = Envelope::from_service_envelope(payload).map_err(|err| {
            warn!(len = payload.len(), error = %err, "unreadable service envelope");
            err
        })?;
        self.decode(&envelope)
    }

    /// Decode a bare `MeshPacket`, as relayed without a service envelope.
    ///
    /// Such packets carry no channel name: `pki_encrypted` selects the direct
    /// path, otherwise the channel is found by the hash in `channel`.
    pub fn decode_mesh_packet(&self, payload: &[u8]) -> Result<DecodedPacket> {
        let packet = MeshPacket::decode(payload).map_err(|err| {
            warn!(len = payload.len(), error = %err, "unreadable mesh packet");
            DecodeError::MalformedPlaintext(format!("mesh packet: {}", err))
        })?;

        let channel_id = if packet.pki_encrypted {
            PKI_CHANNEL_ID.to_string()
        } else {
            self.channel_for_packet(&packet)?
        };
        self.decode(&Envelope::from_mesh_packet(&packet, &channel_id))
    }

    fn channel_for_packet(&self, packet: &MeshPacket) -> Result<String> {
        if !matches!(packet.payload_variant, Some(mesh_packet::PayloadVariant::Encrypted(_))) {
            return Ok(String::new());
        }

        u8::try_from(packet.channel)
            .ok()
            .and_then(|hash| self.keys.channel_for_hash(hash))
            .ok_or_else(|| {
                warn!(
                    channel = packet.channel,
                    sender = %node_address(packet.from),
                    packet_id = packet.id,
                    "no channel key for hash"
                );
                DecodeError::KeyNotFound(format!("channel hash {:#04x}", packet.channel))
                    .conceal()
            })
    }

    fn decrypt_channel(&self, envelope: &Envelope, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .keys
            .lookup(&envelope.channel_id)
            .and_then(|material| material.into_channel_key())
            .ok_or_else(|| DecodeError::KeyNotFound(envelope.channel_id.clone()))?;

        open_channel(&key, envelope.packet_id, envelope.sender_id, ciphertext)
    }

    fn decrypt_direct(&self, envelope: &Envelope, payload: &[u8]) -> Result<Vec<u8>> {
        let trailer = DirectTrailer::split(payload)?;

        let local_address = node_address(envelope.dest_id);
        let local_private = self
            .keys
            .lookup(&local_address)
            .and_then(|material| material.into_private_key())
            .ok_or(DecodeError::KeyNotFound(local_address))?;

        let remote_address = node_address(envelope.sender_id);
        let remote_public = self
            .keys
            .lookup(&remote_address)
            .and_then(|material| material.public_key())
            .ok_or(DecodeError::KeyNotFound(remote_address))?;

        debug!(
            sender = %node_address(envelope.sender_id),
            dest = %node_address(envelope.dest_id),
            len = trailer.ciphertext.len(),
            extra_nonce = trailer.extra_nonce,
            "opening direct packet"
        );

        open_direct(
            envelope.packet_id,
            envelope.sender_id,
            &local_private,
            &remote_public,
            &trailer,
        )
    }
}
