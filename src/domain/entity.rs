// src/domain/entity.rs

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

use super::Timestamp;

pub const ID_FIELD: &str = "id";

/// One catalog record as returned by upstream. The core never types its
/// attributes; it only guarantees a JSON object with a non-empty string `id`
/// without surrounding whitespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    fields: Map<String, Value>,
}

impl Entity {
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let id = fields.get(ID_FIELD)?.as_str()?;
        // The id must be usable verbatim: lookups, storage and diffs all key on it.
        if id.is_empty() || id.trim() != id {
            return None;
        }
        let id = id.to_string();
        Some(Self { id, fields })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Human label for feeds: the `name` attribute when upstream sends one.
    pub fn display_name(&self) -> &str {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Entity::from_value(value)
            .ok_or_else(|| D::Error::custom("entity must be an object with a string id"))
    }
}

/// Keeps valid records in upstream order; drops malformed ones and repeated ids.
pub fn parse_entities(values: Vec<Value>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        let Some(entity) = Entity::from_value(value) else {
            warn!(index, "skipping upstream record without a string id");
            continue;
        };
        if !seen.insert(entity.id.clone()) {
            warn!(id = %entity.id, "skipping duplicate upstream record");
            continue;
        }
        out.push(entity);
    }

    out
}

/// A current entity together with the time it was (last) added.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub entity: Entity,
    pub added_at: Timestamp,
}

/// An entity no longer listed upstream, with the time it disappeared.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntity {
    pub entity: Entity,
    pub removed_at: Timestamp,
}

impl Serialize for TrackedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_stamped(serializer, &self.entity, "added_at", &self.added_at)
    }
}

impl Serialize for RemovedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_stamped(serializer, &self.entity, "removed_at", &self.removed_at)
    }
}

fn serialize_stamped<S: Serializer>(
    serializer: S,
    entity: &Entity,
    key: &str,
    at: &Timestamp,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(None)?;
    for (k, v) in entity.fields.iter().filter(|(k, _)| k.as_str() != key) {
        map.serialize_entry(k, v)?;
    }
    map.serialize_entry(key, at)?;
    map.end()
}
