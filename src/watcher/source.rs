// src/watcher/source.rs
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::domain::{parse_entities, Entity};
use crate::watcher::FetchError;

const USER_AGENT: &str = concat!("model-watcher/", env!("CARGO_PKG_VERSION"));

const FIXTURE_MODELS: &str = include_str!("../../fixtures/models.json");

/// Where the watcher gets the current catalog from.
pub trait ModelSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<Entity>, FetchError>;
}

/// Live upstream REST endpoint.
pub struct CatalogClient {
    client: Client,
    url: String,
}

impl CatalogClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ModelSource for CatalogClient {
    fn fetch(&self) -> Result<Vec<Entity>, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Value = resp.json().map_err(|e| FetchError::Decode(e.to_string()))?;
        let models = entities_from_payload(body)?;
        debug!(url = %self.url, count = models.len(), "fetched upstream catalog");
        Ok(models)
    }
}

/// Bundled list used instead of the network in development mode.
pub struct FixtureSource {
    models: Vec<Entity>,
}

impl FixtureSource {
    pub fn bundled() -> Result<Self, FetchError> {
        Self::from_json(FIXTURE_MODELS)
    }

    pub fn from_json(json: &str) -> Result<Self, FetchError> {
        let body: Value = serde_json::from_str(json).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Self {
            models: entities_from_payload(body)?,
        })
    }
}

impl ModelSource for FixtureSource {
    fn fetch(&self) -> Result<Vec<Entity>, FetchError> {
        Ok(self.models.clone())
    }
}

/// Accepts either a bare array or `{"data": [...]}`.
pub fn entities_from_payload(body: Value) -> Result<Vec<Entity>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(FetchError::UnexpectedShape("no `data` array".into())),
        },
        other => {
            return Err(FetchError::UnexpectedShape(format!(
                "expected array or object, got {other}"
            )))
        }
    };
    Ok(parse_entities(items))
}

pub fn source_for(config: &Config) -> Result<Box<dyn ModelSource>, FetchError> {
    if config.development {
        Ok(Box::new(FixtureSource::bundled()?))
    } else {
        Ok(Box::new(CatalogClient::new(
            config.upstream_url.clone(),
            config.fetch_timeout,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_accepts_data_wrapper_and_bare_array() {
        let wrapped = entities_from_payload(json!({"data": [{"id": "a"}, {"id": "b"}]})).unwrap();
        let bare = entities_from_payload(json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(wrapped, bare);
        assert_eq!(wrapped.len(), 2);
    }

    #[test]
    fn payload_rejects_other_shapes() {
        assert!(matches!(
            entities_from_payload(json!({"models": []})),
            Err(FetchError::UnexpectedShape(_))
        ));
        assert!(entities_from_payload(json!("nope")).is_err());
    }

    #[test]
    fn bundled_fixture_is_non_empty() {
        let source = FixtureSource::bundled().unwrap();
        let models = source.fetch().unwrap();
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| !m.id().is_empty()));
    }
}
