//! Key storage for channel PSKs and node X25519 keys.
//!
//! A [`Keyring`] is built once from configuration and never mutated, so it
//! can be shared across worker threads behind an `Arc` without locking.
//! [`SharedKeyring`] adds atomic replacement for deployments that rotate
//! keys at runtime; each decode works against one consistent snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::config::{decode_base64_key, GatewayConfig};
use crate::crypto::{channel_hash, ChannelKey};
use crate::dispatcher::MeshDecoder;
use crate::keys::PrivateKey;
use crate::types::{DecodeError, Result, CURVE_KEY_SIZE};

/// Format a node id as the `!hex` address used for keyring lookups.
pub fn node_address(node_id: u32) -> String {
    format!("!{:x}", node_id)
}

/// Key material stored under one identifier.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// Pre-shared key of a named channel.
    Channel(ChannelKey),
    /// X25519 private key of a node.
    Private(PrivateKey),
    /// X25519 public key of a node.
    Public([u8; 32]),
}

impl KeyMaterial {
    /// The node's public key, derived locally when only the private key is held.
    pub fn public_key(&self) -> Option<[u8; 32]> {
        match self {
            KeyMaterial::Private(key) => Some(key.public_key()),
            KeyMaterial::Public(key) => Some(*key),
            KeyMaterial::Channel(_) => None,
        }
    }

    /// The private key, if this entry holds one.
    pub fn into_private_key(self) -> Option<PrivateKey> {
        match self {
            KeyMaterial::Private(key) => Some(key),
            _ => None,
        }
    }

    /// The channel key, if this entry holds one.
    pub fn into_channel_key(self) -> Option<ChannelKey> {
        match self {
            KeyMaterial::Channel(key) => Some(key),
            _ => None,
        }
    }
}

/// Key lookup by channel name or `!nodeid` address.
pub trait KeyLookup {
    /// Find the key material stored under `identifier`.
    fn lookup(&self, identifier: &str) -> Option<KeyMaterial>;

    /// Name of the channel whose [`channel_hash`] is `hash`.
    ///
    /// Raw mesh packets carry only this hash, not the channel name.
    fn channel_for_hash(&self, _hash: u8) -> Option<String> {
        None
    }
}

impl<K: KeyLookup + ?Sized> KeyLookup for &K {
    fn lookup(&self, identifier: &str) -> Option<KeyMaterial> {
        (**self).lookup(identifier)
    }

    fn channel_for_hash(&self, hash: u8) -> Option<String> {
        (**self).channel_for_hash(hash)
    }
}

impl<K: KeyLookup + ?Sized> KeyLookup for Arc<K> {
    fn lookup(&self, identifier: &str) -> Option<KeyMaterial> {
        (**self).lookup(identifier)
    }

    fn channel_for_hash(&self, hash: u8) -> Option<String> {
        (**self).channel_for_hash(hash)
    }
}

/// Immutable keyring.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    entries: HashMap<String, KeyMaterial>,
    channel_hashes: HashMap<u8, String>,
}

impl Keyring {
    /// Start building a keyring.
    pub fn builder() -> KeyringBuilder {
        KeyringBuilder::default()
    }

    /// Build the keyring from the gateway configuration.
    ///
    /// `b64Key` identifiers starting with `!` are node private keys, the rest
    /// are channel PSKs. `b64PublicKey` entries are node public keys; a
    /// private key configured for the same node takes precedence.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut builder = Self::builder();
        let mut public_keys = HashMap::new();

        for (identifier, encoded) in config.public_entries() {
            let bytes = decode_base64_key(encoded)?;
            let key: [u8; CURVE_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
                DecodeError::Config(format!(
                    "public key for {} must be {} bytes, got {}",
                    identifier,
                    CURVE_KEY_SIZE,
                    bytes.len()
                ))
            })?;
            public_keys.insert(identifier, key);
            builder = builder.with_public_key(identifier, key);
        }

        for (identifier, encoded) in config.secret_entries() {
            let bytes = decode_base64_key(encoded)?;
            builder = if identifier.starts_with('!') {
                builder.with_verified_private_key(
                    identifier,
                    PrivateKey::from_slice(&bytes)?,
                    public_keys.get(identifier),
                )?
            } else {
                builder.with_channel_psk(identifier, &bytes)?
            };
        }

        let keyring = builder.build();
        info!(
            entries = keyring.len(),
            channels = keyring.channel_hashes.len(),
            "keyring loaded"
        );
        Ok(keyring)
    }

    /// Number of stored identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the keyring holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyLookup for Keyring {
    fn lookup(&self, identifier: &str) -> Option<KeyMaterial> {
        self.entries.get(identifier).cloned()
    }

    fn channel_for_hash(&self, hash: u8) -> Option<String> {
        self.channel_hashes.get(&hash).cloned()
    }
}

/// Builder for [`Keyring`].
#[derive(Debug, Default)]
pub struct KeyringBuilder {
    entries: HashMap<String, KeyMaterial>,
    channel_hashes: HashMap<u8, String>,
}

impl KeyringBuilder {
    /// Add an already expanded channel key.
    ///
    /// When two channels share a hash, the first one added keeps it.
    pub fn with_channel(mut self, name: &str, key: ChannelKey) -> Self {
        self.channel_hashes
            .entry(channel_hash(name, &key))
            .or_insert_with(|| name.to_string());
        self.entries
            .insert(name.to_string(), KeyMaterial::Channel(key));
        self
    }

    /// Add a channel from its configured PSK (see [`ChannelKey::from_psk`]).
    pub fn with_channel_psk(self, name: &str, psk: &[u8]) -> Result<Self> {
        Ok(self.with_channel(name, ChannelKey::from_psk(psk)?))
    }

    /// Add a node private key.
    pub fn with_private_key(mut self, address: &str, key: PrivateKey) -> Self {
        self.entries
            .insert(address.to_string(), KeyMaterial::Private(key));
        self
    }

    /// Add a node public key. Ignored if the node's private key is already held.
    pub fn with_public_key(mut self, address: &str, key: [u8; 32]) -> Self {
        let holds_private = matches!(self.entries.get(address), Some(KeyMaterial::Private(_)));
        if !holds_private {
            self.entries
                .insert(address.to_string(), KeyMaterial::Public(key));
        }
        self
    }

    /// Add a node private key, checking it against the node's configured
    /// public key when there is one.
    pub fn with_verified_private_key(
        self,
        address: &str,
        key: PrivateKey,
        expected_public: Option<&[u8; 32]>,
    ) -> Result<Self> {
        if let Some(expected) = expected_public {
            if &key.public_key() != expected {
                return Err(DecodeError::Config(format!(
                    "private key for {} does not match its public key",
                    address
                )));
            }
        }
        Ok(self.with_private_key(address, key))
    }

    /// Freeze the keyring.
    pub fn build(self) -> Keyring {
        Keyring {
            entries: self.entries,
            channel_hashes: self.channel_hashes,
        }
    }
}

/// A keyring that can be replaced while decoders are running.
#[derive(Debug, Default)]
pub struct SharedKeyring {
    current: RwLock<Arc<Keyring>>,
}

impl SharedKeyring {
    /// Wrap an initial keyring.
    pub fn new(keyring: Keyring) -> Self {
        Self {
            current: RwLock::new(Arc::new(keyring)),
        }
    }

    /// The keyring in effect right now.
    pub fn snapshot(&self) -> Arc<Keyring> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Atomically swap in a new keyring. In-flight decodes keep their snapshot.
    pub fn replace(&self, keyring: Keyring) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(keyring);
        info!(entries = guard.len(), "keyring replaced");
    }

    /// A decoder bound to the current snapshot.
    pub fn decoder(&self) -> MeshDecoder<Arc<Keyring>> {
        MeshDecoder::new(self.snapshot())
    }
}
