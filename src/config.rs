//! Gateway configuration file.
//!
//! The gateway reads one JSON document at startup. Only the key lists feed
//! the decoder; broker, topic and publisher settings are carried for the
//! surrounding MQTT and Telegraf layers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::types::{DecodeError, Result};

/// Per-topic handler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Handler name.
    pub name: String,
    /// Handler location.
    pub path: String,
    /// MQTT QoS for the subscription.
    pub qos: u8,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// MQTT broker URL.
    pub broker: String,
    /// Subscribed topics and their handlers.
    pub topics: HashMap<String, PluginConfig>,
    /// MQTT client id.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// MQTT username.
    pub username: String,
    /// MQTT password.
    pub password: String,
    /// Channel PSKs and node private keys, base64, keyed by channel name or `!nodeid`.
    #[serde(rename = "b64Key")]
    pub b64_keys: Vec<HashMap<String, String>>,
    /// Node public keys, base64, keyed by `!nodeid`.
    #[serde(rename = "b64PublicKey")]
    pub b64_public_keys: Vec<HashMap<String, String>>,
    /// Telegraf HTTP listener for derived metrics.
    #[serde(rename = "telegrafURL")]
    pub telegraf_url: String,
}

impl GatewayConfig {
    /// Parse a configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DecodeError::Config(format!("invalid config JSON: {}", e)))
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DecodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// QoS to request for each subscribed topic.
    pub fn topic_qos(&self) -> HashMap<String, u8> {
        self.topics
            .iter()
            .map(|(topic, plugin)| (topic.clone(), plugin.qos))
            .collect()
    }

    /// Flattened `(identifier, base64)` pairs from `b64Key`.
    pub fn secret_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        flatten(&self.b64_keys)
    }

    /// Flattened `(identifier, base64)` pairs from `b64PublicKey`.
    pub fn public_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        flatten(&self.b64_public_keys)
    }
}

fn flatten(entries: &[HashMap<String, String>]) -> impl Iterator<Item = (&str, &str)> {
    entries
        .iter()
        .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Decode a base64 key, accepting the URL-safe alphabet as well.
pub fn decode_base64_key(text: &str) -> Result<Vec<u8>> {
    let normalized = text.trim().replace('-', "+").replace('_', "/");
    STANDARD
        .decode(normalized)
        .map_err(|e| DecodeError::Config(format!("invalid base64 key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "broker": "tcp://mqtt.example.net:1883",
        "clientID": "meshdecode-test",
        "username": "meshdev",
        "password": "large4cats",
        "topics": {
            "msh/US/#": {"name": "msh", "path": "plugins/msh.so", "qos": 1}
        },
        "b64Key": [
            {"LongFast": "AQ=="},
            {"!a1b2c3d4": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE="}
        ],
        "telegrafURL": "http://127.0.0.1:8186/telegraf"
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = GatewayConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.client_id, "meshdecode-test");
        assert_eq!(config.telegraf_url, "http://127.0.0.1:8186/telegraf");
        assert_eq!(config.secret_entries().count(), 2);
        assert_eq!(config.public_entries().count(), 0);
        assert_eq!(config.topic_qos().get("msh/US/#"), Some(&1));
    }

    #[test]
    fn test_missing_fields_default() {
        let config = GatewayConfig::from_json("{}").unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            GatewayConfig::from_json("{\"b64Key\": 3}"),
            Err(DecodeError::Config(_))
        ));
    }

    #[test]
    fn test_decode_base64_key() {
        assert_eq!(decode_base64_key("AQ==").unwrap(), vec![1]);
        // URL-safe alphabet maps onto the standard one.
        assert_eq!(
            decode_base64_key("1PG7OiApB1nwvP-rz05pAQ==").unwrap(),
            decode_base64_key("1PG7OiApB1nwvP+rz05pAQ==").unwrap()
        );
        assert!(matches!(decode_base64_key("!!"), Err(DecodeError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            GatewayConfig::load("/nonexistent/meshdecode.json"),
            Err(DecodeError::Config(_))
        ));
    }
}
