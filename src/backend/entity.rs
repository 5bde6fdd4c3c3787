use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// EntityState is one remote entity as last reported by the backend.
///
/// Snapshots are replaced wholesale on every update and shared as
/// `Arc<EntityState>`, so observers always see a complete record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Unique entity identifier (e.g., "light.kitchen", "climate.office")
    pub entity_id: String,

    /// Current state string ("on", "off", "heat", "unavailable", ...)
    pub state: String,

    /// Domain-specific attributes (friendly_name, preset_mode, ...)
    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reported: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Opaque origin context of the last change
    #[serde(default)]
    pub context: Value,
}

impl EntityState {
    /// Returns a string attribute, if present.
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Human readable name reported by the backend.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attribute_str("friendly_name")
    }

    /// Domain part of the entity id ("light" for "light.kitchen").
    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }
}

/// Splits the domain off an entity id. Ids without a dot are their own domain.
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}
