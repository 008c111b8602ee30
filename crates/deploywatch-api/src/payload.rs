//! Typed access to the open `data` map of a deployment event
//!
//! Producers add fields freely, so nothing here is required: every accessor
//! falls back to a documented default when the key is missing or has an
//! unexpected JSON type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event payload (`data` on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

/// A server reported by a teardown discovery event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Infrastructure ID
    pub id: String,
    /// Display name (first 8 characters of the ID when not reported)
    pub name: String,
}

/// Per-host statistics carried by a `recap` event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecapCounts {
    pub ok: u64,
    pub changed: u64,
    pub unreachable: u64,
    pub failures: u64,
    pub skipped: u64,
    pub rescued: u64,
    pub ignored: u64,
}

impl RecapCounts {
    /// Whether the host reported any failed or unreachable tasks
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.unreachable > 0
    }
}

impl Payload {
    /// Create an empty payload
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; anything other than an object becomes empty
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    /// Insert a field, returning the payload for chaining
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw field access
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String field, `None` when missing, not a string, or empty
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// String field, empty when missing
    #[must_use]
    pub fn string(&self, key: &str) -> String {
        self.str(key).unwrap_or_default().to_string()
    }

    /// Non-negative counter, 0 when missing
    ///
    /// Accepts integers, floats (truncated) and numeric strings.
    #[must_use]
    pub fn count(&self, key: &str) -> u64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Floating point field, 0.0 when missing
    #[must_use]
    pub fn float(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Boolean flag, false when missing
    ///
    /// Accepts JSON booleans, non-zero numbers and `"true"`/`"yes"`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes"),
            _ => false,
        }
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.str("host")
    }

    #[must_use]
    pub fn vm_name(&self) -> Option<&str> {
        self.str("vm_name")
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.str("error")
    }

    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        self.str("stderr")
    }

    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.str("ip")
    }

    #[must_use]
    pub fn playbook(&self) -> Option<&str> {
        self.str("playbook")
    }

    /// Install stage number as reported (`"1"`, `"2"`), `"?"` when missing
    #[must_use]
    pub fn stage(&self) -> String {
        match self.0.get("stage") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "?".to_string(),
        }
    }

    /// Resource type of a teardown event (`server` or `volume`)
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.str("type")
    }

    /// Resource name, or ID prefix, of a teardown event
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        self.str("name")
    }

    /// Whether the producer marked this failure as tolerated
    #[must_use]
    pub fn ignored(&self) -> bool {
        self.flag("ignored")
    }

    /// Servers listed by a `discovery_servers` event
    #[must_use]
    pub fn discovered_servers(&self) -> Vec<DiscoveredServer> {
        let Some(Value::Array(items)) = self.0.get("servers") else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let (id, name) = match item {
                    Value::String(id) => (id.as_str(), None),
                    Value::Object(obj) => (
                        obj.get("id").and_then(Value::as_str).unwrap_or_default(),
                        obj.get("name").and_then(Value::as_str),
                    ),
                    _ => return None,
                };
                if id.is_empty() {
                    return None;
                }
                let name = name
                    .filter(|n| !n.is_empty())
                    .map_or_else(|| id.chars().take(8).collect(), str::to_string);
                Some(DiscoveredServer {
                    id: id.to_string(),
                    name,
                })
            })
            .collect()
    }

    /// Volume IDs listed by a `discovery_volumes` event
    #[must_use]
    pub fn discovered_volumes(&self) -> Vec<String> {
        let Some(Value::Array(items)) = self.0.get("volumes") else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.as_str()),
                Value::Object(obj) => obj.get("id").and_then(Value::as_str),
                _ => None,
            })
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Statistics of a `recap` event
    #[must_use]
    pub fn recap(&self) -> RecapCounts {
        RecapCounts {
            ok: self.count("ok"),
            changed: self.count("changed"),
            unreachable: self.count("unreachable"),
            failures: self.count("failures"),
            skipped: self.count("skipped"),
            rescued: self.count("rescued"),
            ignored: self.count("ignored"),
        }
    }
}
