//! Packet envelopes and the direct-message trailer layout.

use prost::Message;

use crate::models::{mesh_packet, MeshPacket, ServiceEnvelope};
use crate::types::{
    DecodeError, Result, DIRECT_TRAILER_SIZE, EXTRA_NONCE_SIZE, PKI_CHANNEL_ID, TAG_SIZE,
};

/// Payload of a packet as received from the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadVariant {
    /// Plaintext protobuf bytes, decrypted upstream.
    Decoded(Vec<u8>),
    /// Ciphertext as sent over the air.
    Encrypted(Vec<u8>),
    /// Neither variant present.
    Unknown,
}

/// Routing metadata plus payload of one mesh packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Packet payload.
    pub payload: PayloadVariant,
    /// Node id of the sender.
    pub sender_id: u32,
    /// Node id of the destination (`0xffffffff` for broadcast).
    pub dest_id: u32,
    /// Packet id chosen by the sender.
    pub packet_id: u32,
    /// Channel name, or `"PKI"` for direct messages.
    pub channel_id: String,
}

impl Envelope {
    /// Whether this packet takes the direct (ECDH + CCM) path.
    pub fn is_direct(&self) -> bool {
        self.channel_id == PKI_CHANNEL_ID
    }

    /// Build an envelope from a decoded mesh packet and its channel id.
    ///
    /// A `decoded` payload is re-encoded so the envelope stays byte-oriented.
    pub fn from_mesh_packet(packet: &MeshPacket, channel_id: &str) -> Self {
        let payload = match &packet.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => {
                PayloadVariant::Decoded(data.encode_to_vec())
            }
            Some(mesh_packet::PayloadVariant::Encrypted(bytes)) => {
                PayloadVariant::Encrypted(bytes.clone())
            }
            None => PayloadVariant::Unknown,
        };

        Self {
            payload,
            sender_id: packet.from,
            dest_id: packet.to,
            packet_id: packet.id,
            channel_id: channel_id.to_string(),
        }
    }

    /// Parse a raw MQTT payload (a protobuf `ServiceEnvelope`).
    pub fn from_service_envelope(data: &[u8]) -> Result<Self> {
        let envelope = ServiceEnvelope::decode(data)
            .map_err(|e| DecodeError::MalformedPlaintext(format!("service envelope: {}", e)))?;

        match &envelope.packet {
            Some(packet) => Ok(Self::from_mesh_packet(packet, &envelope.channel_id)),
            None => Ok(Self {
                payload: PayloadVariant::Unknown,
                sender_id: 0,
                dest_id: 0,
                packet_id: 0,
                channel_id: envelope.channel_id,
            }),
        }
    }
}

/// A direct payload split into its parts.
///
/// Wire format:
/// - \[0..n-12\]    ciphertext
/// - \[n-12..n-4\]  CCM tag (8 bytes)
/// - \[n-4..n\]     extra nonce (little-endian u32)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTrailer<'a> {
    /// Encrypted message, never empty.
    pub ciphertext: &'a [u8],
    /// Truncated CCM tag.
    pub mac: [u8; TAG_SIZE],
    /// Sender-chosen nonce component.
    pub extra_nonce: u32,
}

impl<'a> DirectTrailer<'a> {
    /// Split a sealed direct payload.
    ///
    /// Payloads with no ciphertext before the 12-byte trailer are rejected.
    pub fn split(payload: &'a [u8]) -> Result<Self> {
        if payload.len() <= DIRECT_TRAILER_SIZE {
            return Err(DecodeError::InvalidTrailerLength(payload.len()));
        }

        let (ciphertext, trailer) = payload.split_at(payload.len() - DIRECT_TRAILER_SIZE);
        let (mac_bytes, nonce_bytes) = trailer.split_at(TAG_SIZE);

        let mut mac = [0u8; TAG_SIZE];
        mac.copy_from_slice(mac_bytes);
        let mut extra_nonce = [0u8; EXTRA_NONCE_SIZE];
        extra_nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            ciphertext,
            mac,
            extra_nonce: u32::from_le_bytes(extra_nonce),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Data;

    #[test]
    fn test_split_trailer() {
        let payload = [
            0xaa, 0xbb, // ciphertext
            1, 2, 3, 4, 5, 6, 7, 8, // mac
            0xef, 0xbe, 0xad, 0xde, // extra nonce
        ];
        let trailer = DirectTrailer::split(&payload).unwrap();
        assert_eq!(trailer.ciphertext, &[0xaau8, 0xbb][..]);
        assert_eq!(trailer.mac, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(trailer.extra_nonce, 0xdead_beef);
    }

    #[test]
    fn test_split_rejects_empty_ciphertext() {
        assert_eq!(
            DirectTrailer::split(&[0u8; 12]),
            Err(DecodeError::InvalidTrailerLength(12))
        );
        assert_eq!(
            DirectTrailer::split(&[0u8; 5]),
            Err(DecodeError::InvalidTrailerLength(5))
        );
        assert_eq!(DirectTrailer::split(&[]), Err(DecodeError::InvalidTrailerLength(0)));
    }

    #[test]
    fn test_from_service_envelope_encrypted() {
        let envelope = ServiceEnvelope {
            packet: Some(MeshPacket {
                from: 0x1111,
                to: 0x2222,
                id: 77,
                payload_variant: Some(mesh_packet::PayloadVariant::Encrypted(vec![9, 9, 9])),
                ..Default::default()
            }),
            channel_id: "PKI".into(),
            gateway_id: "!00001111".into(),
        };

        let parsed = Envelope::from_service_envelope(&envelope.encode_to_vec()).unwrap();
        assert_eq!(parsed.payload, PayloadVariant::Encrypted(vec![9, 9, 9]));
        assert_eq!(parsed.sender_id, 0x1111);
        assert_eq!(parsed.dest_id, 0x2222);
        assert_eq!(parsed.packet_id, 77);
        assert!(parsed.is_direct());
    }

    #[test]
    fn test_from_service_envelope_decoded() {
        let data = Data {
            portnum: 1,
            payload: b"hi".to_vec(),
            ..Default::default()
        };
        let packet = MeshPacket {
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(data.clone())),
            ..Default::default()
        };

        let parsed = Envelope::from_mesh_packet(&packet, "LongFast");
        assert_eq!(parsed.payload, PayloadVariant::Decoded(data.encode_to_vec()));
        assert!(!parsed.is_direct());
    }

    #[test]
    fn test_missing_packet_is_unknown() {
        let envelope = ServiceEnvelope {
            packet: None,
            channel_id: "LongFast".into(),
            gateway_id: String::new(),
        };
        let parsed = Envelope::from_service_envelope(&envelope.encode_to_vec()).unwrap();
        assert_eq!(parsed.payload, PayloadVariant::Unknown);
    }

    #[test]
    fn test_garbage_service_envelope() {
        let result = Envelope::from_service_envelope(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(DecodeError::MalformedPlaintext(_))));
    }
}
