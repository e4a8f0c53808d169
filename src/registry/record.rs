//! Raw registry entries and identity resolution.
//!
//! Upstream records are loosely typed JSON. Every field is kept as a
//! `serde_json::Value` so that a record with a wrong-typed field still
//! deserializes; [`resolve`] then defaults anything unusable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::ServerKey;

/// One entry from the registry's server list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub name: Value,
    #[serde(default, alias = "address")]
    pub public_ip: Value,
    #[serde(default)]
    pub port: Value,
    #[serde(default)]
    pub map: Value,
    /// Fields we don't interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Convenience constructor for well-formed records.
    pub fn new(name: &str, address: &str, port: u16) -> Self {
        Self {
            name: Value::from(name),
            public_ip: Value::from(address),
            port: Value::from(port),
            ..Self::default()
        }
    }

    pub fn with_map(mut self, map: &str) -> Self {
        self.map = Value::from(map);
        self
    }

    /// Build a record from an arbitrary JSON value.
    ///
    /// Returns `None` for anything that isn't a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// Server name, or `""` when missing or not a string.
    pub fn name(&self) -> &str {
        self.name.as_str().unwrap_or_default()
    }

    /// Public address, or `""` when missing or not a string.
    pub fn address(&self) -> &str {
        self.public_ip.as_str().unwrap_or_default()
    }

    /// Port as announced, or 0 when missing or unparseable.
    pub fn port(&self) -> u16 {
        parse_port(&self.port)
    }

    /// Map label, if the registry sent one.
    pub fn map(&self) -> Option<&str> {
        self.map.as_str()
    }
}

/// Map a raw record to its identity key. Never fails.
pub fn resolve(record: &RawRecord) -> ServerKey {
    ServerKey::new(record.name(), record.address(), record.port())
}

fn parse_port(value: &Value) -> u16 {
    match value {
        Value::Number(n) => {
            if let Some(port) = n.as_u64() {
                u16::try_from(port).unwrap_or(0)
            } else if let Some(port) = n.as_f64() {
                if port.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&port) {
                    port as u16
                } else {
                    0
                }
            } else {
                0
            }
        }
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
