//! meshdecode - Meshtastic packet decryption for MQTT gateways
//!
//! Recovers the protobuf payload of mesh packets relayed over MQTT: channel
//! packets via AES-CTR under the channel PSK, direct (PKI) packets via
//! X25519 + SHA-256 key agreement and AES-CCM.

mod ccm;
mod config;
mod crypto;
mod dispatcher;
mod envelope;
mod keyring;
mod keys;
pub mod models;
mod nonce;
mod types;

pub use ccm::Ccm;
pub use config::*;
pub use crypto::*;
pub use dispatcher::*;
pub use envelope::*;
pub use keyring::*;
pub use keys::*;
pub use nonce::*;
pub use types::*;
