// templates/rss.rs

use maud::{html, Markup, PreEscaped};
use serde_json::Value;

use crate::domain::{ChangeKind, ChangeRecord, Lists};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

pub struct FeedInfo<'a> {
    pub title: &'a str,
    pub description: &'a str,
    /// Absolute site URL, without trailing slash.
    pub site_url: &'a str,
}

/// RSS 2.0 document for the given change records (already newest first).
pub fn rss_feed(feed: &FeedInfo<'_>, changes: &[ChangeRecord], lists: &Lists) -> Markup {
    html! {
        (PreEscaped(XML_DECLARATION))
        rss version="2.0" {
            channel {
                title { (feed.title) }
                link { (feed.site_url) }
                description { (feed.description) }
                @if let Some(latest) = changes.first() {
                    lastBuildDate { (latest.timestamp.to_rfc2822()) }
                }
                @for change in changes {
                    item {
                        title { (item_title(change, lists)) }
                        link { (item_link(feed.site_url, &change.id)) }
                        guid isPermaLink="false" {
                            (change.id) "@" (change.type_name()) "@" (change.timestamp.timestamp_millis())
                        }
                        pubDate { (change.timestamp.to_rfc2822()) }
                        description { (item_description(change)) }
                    }
                }
            }
        }
    }
}

fn item_title(change: &ChangeRecord, lists: &Lists) -> String {
    match &change.kind {
        ChangeKind::Added { model } => format!("New model: {}", model.display_name()),
        ChangeKind::Removed { model } => format!("Removed model: {}", model.display_name()),
        ChangeKind::Changed { changes } => {
            let name = lists.display_name(&change.id);
            match changes.len() {
                1 => format!("{name}: 1 field changed"),
                n => format!("{name}: {n} fields changed"),
            }
        }
    }
}

fn item_link(site_url: &str, id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("{site_url}/api/model?id={encoded}")
}

fn item_description(change: &ChangeRecord) -> String {
    match &change.kind {
        ChangeKind::Added { .. } => format!("{} was added to the catalog.", change.id),
        ChangeKind::Removed { .. } => format!("{} was removed from the catalog.", change.id),
        ChangeKind::Changed { changes } => changes
            .iter()
            .map(|(path, c)| format!("{path}: {} -> {}", short(&c.old), short(&c.new)))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

fn short(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}
