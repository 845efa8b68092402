// src/api.rs
use astra::Request;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ContentCache, Resource};
use crate::domain::{self, ChangeRecord, CheckStatus, Entity, Lists, Timestamp, WatcherStatus};
use crate::errors::ServerError;
use crate::responses::{json_response, ResultResp};
use crate::templates::{rss_feed, FeedInfo};
use crate::watcher::Watcher;

/// Bumped whenever a JSON shape changes; clients refuse to render on mismatch.
pub const API_VERSION: u32 = 1;

const JSON: &str = "application/json; charset=utf-8";
const RSS: &str = "application/rss+xml; charset=utf-8";

/// Everything a request handler needs, passed explicitly to the router.
pub struct AppState {
    pub watcher: Arc<Watcher>,
    pub cache: ContentCache,
}

impl AppState {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        let cache = ContentCache::new(&watcher.config().cache_dir);
        Self { watcher, cache }
    }

    /// Intermediate caches expire around the watcher's next poll.
    fn max_age(&self) -> Duration {
        self.watcher.next_check_in(domain::now())
    }
}

#[derive(Serialize)]
struct ListsBody<'a> {
    version: u32,
    lists: &'a Lists,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusFields {
    is_valid: bool,
    is_development: bool,
    api_last_check: Option<Timestamp>,
    api_last_check_status: CheckStatus,
    db_last_change: Option<Timestamp>,
}

#[derive(Serialize)]
struct StatusBody {
    version: u32,
    status: StatusFields,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelBody<'a> {
    version: u32,
    model: &'a Entity,
    /// Set when the model is currently listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    added_at: Option<Timestamp>,
    /// Set when the model has been removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    removed_at: Option<Timestamp>,
    history: Vec<ChangeRecord>,
}

pub fn lists(req: &Request, app: &AppState) -> ResultResp {
    let status = app.watcher.status();
    let resource = Resource {
        name: "lists.json",
        content_type: JSON,
        basis: status.db_last_change,
        max_age: app.max_age(),
    };

    app.cache.serve(req, &resource, || {
        let lists = app.watcher.lists();
        let body = ListsBody {
            version: API_VERSION,
            lists: &lists,
        };
        Ok(serde_json::to_vec(&body)?)
    })
}

pub fn status(req: &Request, app: &AppState) -> ResultResp {
    let status = app.watcher.status();
    let resource = Resource {
        name: "status.json",
        content_type: JSON,
        basis: status.api_last_check,
        max_age: app.max_age(),
    };

    app.cache.serve(req, &resource, || {
        let body = StatusBody {
            version: API_VERSION,
            status: status_fields(&status, &app.watcher.lists(), app.watcher.config().development),
        };
        Ok(serde_json::to_vec(&body)?)
    })
}

/// Data is valid when a snapshot exists and the last check did not fail.
fn status_fields(status: &WatcherStatus, lists: &Lists, development: bool) -> StatusFields {
    StatusFields {
        is_valid: !lists.models.is_empty() && status.api_last_check_status != CheckStatus::Failed,
        is_development: development,
        api_last_check: status.api_last_check,
        api_last_check_status: status.api_last_check_status,
        db_last_change: status.db_last_change,
    }
}

pub fn rss(req: &Request, app: &AppState) -> ResultResp {
    let status = app.watcher.status();
    let resource = Resource {
        name: "rss.xml",
        content_type: RSS,
        basis: status.db_last_change,
        max_age: app.max_age(),
    };

    app.cache.serve(req, &resource, || {
        let config = app.watcher.config();
        let lists = app.watcher.lists();
        let recent: Vec<ChangeRecord> = lists.changes.iter().take(config.rss_items).cloned().collect();
        let feed = FeedInfo {
            title: "AI model catalog changes",
            description: "Models added to, removed from, or changed in the upstream catalog",
            site_url: &config.public_url,
        };
        Ok(rss_feed(&feed, &recent, &lists).into_string().into_bytes())
    })
}

/// `GET /api/model?id=...`: one entity (current or removed) with its history.
pub fn model(req: &Request, app: &AppState) -> ResultResp {
    let id = query_param(req, "id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("missing query parameter 'id'".into()))?;

    let lists = app.watcher.lists();
    let (model, added_at, removed_at) = if let Some(m) = lists.find_model(&id) {
        (&m.entity, Some(m.added_at), None)
    } else if let Some(m) = lists.find_removed(&id) {
        (&m.entity, None, Some(m.removed_at))
    } else {
        return Err(ServerError::NotFound);
    };

    let history = app
        .watcher
        .database()
        .with_conn(|conn| crate::db::snapshot::changes_for(conn, &id))?;

    json_response(&ModelBody {
        version: API_VERSION,
        model,
        added_at,
        removed_at,
        history,
    })
}

fn query_param(req: &Request, key: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
