// src/domain/lists.rs

use serde::Serialize;

use super::{ChangeRecord, Entity, RemovedEntity, Timestamp, TrackedEntity};

/// Outcome of the most recent upstream check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Failed,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Success => "success",
            CheckStatus::Failed => "failed",
            CheckStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => CheckStatus::Success,
            "failed" => CheckStatus::Failed,
            _ => CheckStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub api_last_check: Option<Timestamp>,
    pub api_last_check_status: CheckStatus,
    /// Most recent stored change or snapshot write.
    pub db_last_change: Option<Timestamp>,
}

impl Default for WatcherStatus {
    fn default() -> Self {
        Self {
            api_last_check: None,
            api_last_check_status: CheckStatus::Unknown,
            db_last_change: None,
        }
    }
}

/// In-memory mirror of the store. Always rebuilt whole from the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lists {
    pub models: Vec<TrackedEntity>,
    pub removed: Vec<RemovedEntity>,
    /// Most recent first.
    pub changes: Vec<ChangeRecord>,
}

impl Lists {
    pub fn current_entities(&self) -> Vec<Entity> {
        self.models.iter().map(|m| m.entity.clone()).collect()
    }

    pub fn find_model(&self, id: &str) -> Option<&TrackedEntity> {
        self.models.iter().find(|m| m.entity.id() == id)
    }

    pub fn find_removed(&self, id: &str) -> Option<&RemovedEntity> {
        self.removed.iter().find(|m| m.entity.id() == id)
    }

    /// Best label for an id, whether current or removed.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.find_model(id)
            .map(|m| m.entity.display_name())
            .or_else(|| self.find_removed(id).map(|m| m.entity.display_name()))
            .unwrap_or(id)
    }
}
