// src/domain/changes.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Entity, Timestamp};
use crate::errors::ServerError;

/// Old and new value of one changed leaf. An absent key reads as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Dotted field path (`"pricing.prompt"`) to its old/new pair.
pub type FieldChanges = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeKind {
    Added { model: Entity },
    Removed { model: Entity },
    Changed { changes: FieldChanges },
}

/// Persisted evidence of one transition for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub id: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub timestamp: Timestamp,
}

impl ChangeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChangeKind::Added { .. } => "added",
            ChangeKind::Removed { .. } => "removed",
            ChangeKind::Changed { .. } => "changed",
        }
    }

    /// JSON stored in `changes.payload`: the entity for added/removed,
    /// the field map for changed.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ChangeKind::Added { model } | ChangeKind::Removed { model } => model.to_json(),
            ChangeKind::Changed { changes } => serde_json::to_string(changes),
        }
    }

    pub fn from_stored(type_name: &str, payload: &str) -> Result<Self, ServerError> {
        let kind = match type_name {
            "added" => ChangeKind::Added {
                model: serde_json::from_str(payload)?,
            },
            "removed" => ChangeKind::Removed {
                model: serde_json::from_str(payload)?,
            },
            "changed" => ChangeKind::Changed {
                changes: serde_json::from_str(payload)?,
            },
            other => {
                return Err(ServerError::DbError(format!("unknown change type '{other}'")));
            }
        };
        Ok(kind)
    }
}

impl ChangeRecord {
    pub fn added(entity: &Entity, timestamp: Timestamp) -> Self {
        Self {
            id: entity.id().to_string(),
            kind: ChangeKind::Added {
                model: entity.clone(),
            },
            timestamp,
        }
    }

    pub fn removed(entity: &Entity, timestamp: Timestamp) -> Self {
        Self {
            id: entity.id().to_string(),
            kind: ChangeKind::Removed {
                model: entity.clone(),
            },
            timestamp,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::from_millis;
    use serde_json::json;

    #[test]
    fn changed_record_serializes_with_type_tag() {
        let mut changes = FieldChanges::new();
        changes.insert(
            "pricing.prompt".into(),
            FieldChange {
                old: json!("0.01"),
                new: json!("0.02"),
            },
        );
        let record = ChangeRecord {
            id: "1".into(),
            kind: ChangeKind::Changed { changes },
            timestamp: from_millis(0),
        };

        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(
            v,
            json!({
                "id": "1",
                "type": "changed",
                "changes": {"pricing.prompt": {"old": "0.01", "new": "0.02"}},
                "timestamp": "1970-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn stored_payload_restores_kind() {
        let entity = Entity::from_value(json!({"id": "m", "ctx": 8})).unwrap();
        let kind = ChangeKind::Removed { model: entity };
        let payload = kind.payload_json().unwrap();

        let restored = ChangeKind::from_stored(kind.type_name(), &payload).unwrap();
        assert_eq!(restored, kind);
        assert!(ChangeKind::from_stored("renamed", "{}").is_err());
    }
}
