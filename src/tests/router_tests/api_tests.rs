// src/tests/router_tests/api_tests.rs
use crate::api::API_VERSION;
use crate::tests::utils::{entities, header, read_body, read_json, TestApp};
use serde_json::json;
use std::time::Duration;

fn seeded() -> TestApp {
    TestApp::seeded(entities(vec![
        json!({"id": "acme/a", "name": "A", "context_length": 8192}),
        json!({"id": "acme/b", "name": "B"}),
    ]))
}

fn mutate(t: &TestApp) {
    // Cached files carry a wall-clock mtime; step past it.
    std::thread::sleep(Duration::from_millis(20));
    t.source.push(entities(vec![
        json!({"id": "acme/a", "name": "A", "context_length": 32768}),
        json!({"id": "acme/c", "name": "C & D"}),
    ]));
    t.watcher().check().unwrap();
}

#[test]
fn status_reports_valid_snapshot() {
    let t = seeded();

    let resp = t.get("/api/status");
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "Content-Type"), "application/json; charset=utf-8");
    assert_eq!(header(&resp, "Vary"), "Accept-Encoding");
    assert!(header(&resp, "Cache-Control").starts_with("public, max-age="));

    let body = read_json(resp);
    assert_eq!(body["version"], json!(API_VERSION));
    assert_eq!(body["status"]["isValid"], json!(true));
    assert_eq!(body["status"]["isDevelopment"], json!(false));
    assert_eq!(body["status"]["apiLastCheckStatus"], json!("success"));
    assert!(body["status"]["dbLastChange"].is_string());
}

#[test]
fn status_is_invalid_after_failed_check() {
    let t = seeded();
    std::thread::sleep(Duration::from_millis(20));
    t.watcher().check().unwrap(); // nothing queued: empty twice

    let body = read_json(t.get("/api/status"));
    assert_eq!(body["status"]["isValid"], json!(false));
    assert_eq!(body["status"]["apiLastCheckStatus"], json!("failed"));
}

#[test]
fn etag_is_stable_until_the_store_changes() {
    let t = seeded();

    let first = header(&t.get("/api/lists"), "ETag");
    let second = header(&t.get("/api/lists"), "ETag");
    assert!(!first.is_empty());
    assert_eq!(first, second);

    let status_a = header(&t.get("/api/status"), "ETag");
    let status_b = header(&t.get("/api/status"), "ETag");
    assert_eq!(status_a, status_b);

    mutate(&t);

    let after = t.get("/api/lists");
    assert_ne!(header(&after, "ETag"), first);
    let body = read_json(after);
    let ids: Vec<&str> = body["lists"]["models"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["acme/a", "acme/c"]);
}

#[test]
fn matching_etag_gets_not_modified() {
    let t = seeded();
    let etag = header(&t.get("/api/lists"), "ETag");

    let resp = t.get_with("/api/lists", &[("If-None-Match", &etag)]);
    assert_eq!(resp.status(), 304);
    assert_eq!(header(&resp, "ETag"), etag);
    assert!(read_body(resp).is_empty());
}

#[test]
fn lists_payload_shape() {
    let t = seeded();
    mutate(&t);

    let body = read_json(t.get("/api/lists"));
    assert_eq!(body["version"], json!(API_VERSION));

    let lists = &body["lists"];
    assert!(lists["models"][0]["added_at"].is_string());
    assert_eq!(lists["removed"][0]["id"], json!("acme/b"));
    assert!(lists["removed"][0]["removed_at"].is_string());

    let changes = lists["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 3);
    let types: Vec<&str> = changes.iter().filter_map(|c| c["type"].as_str()).collect();
    assert_eq!(types, vec!["added", "removed", "changed"]);
    assert_eq!(
        changes[2]["changes"]["context_length"],
        json!({"old": 8192, "new": 32768})
    );
}

#[test]
fn gzip_variant_when_accepted() {
    let t = seeded();

    let resp = t.get_with("/api/lists", &[("Accept-Encoding", "gzip, deflate")]);
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "Content-Encoding"), "gzip");

    let plain = t.get("/api/lists");
    assert_eq!(header(&plain, "Content-Encoding"), "");
}

#[test]
fn rss_lists_recent_changes() {
    let t = seeded();
    mutate(&t);

    let resp = t.get("/rss");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        header(&resp, "Content-Type"),
        "application/rss+xml; charset=utf-8"
    );

    let xml = read_body(resp);
    assert_eq!(xml.matches("<item>").count(), 3);
    assert!(xml.contains("New model: C &amp; D"));
    assert!(xml.contains("Removed model: B"));
    assert!(xml.contains("https://watch.test/api/model?id=acme%2Fc"));
}

#[test]
fn model_lookup() {
    let t = seeded();
    mutate(&t);

    let missing = t.get("/api/model");
    assert_eq!(missing.status(), 400);
    assert_eq!(header(&missing, "Content-Type"), "application/json; charset=utf-8");
    assert!(read_json(missing)["error"].is_string());

    assert_eq!(t.get("/api/model?id=nope%2Fnothing").status(), 404);

    let current = t.get("/api/model?id=acme%2Fa");
    assert_eq!(current.status(), 200);
    let body = read_json(current);
    assert_eq!(body["model"]["context_length"], json!(32768));
    assert!(body["addedAt"].is_string());
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["history"][0]["type"], json!("changed"));

    let removed = read_json(t.get("/api/model?id=acme/b"));
    assert_eq!(removed["model"]["name"], json!("B"));
    assert!(removed["removedAt"].is_string());
    assert_eq!(removed["history"][0]["type"], json!("removed"));
}

#[test]
fn unknown_api_path_is_json_404() {
    let t = seeded();

    let resp = t.get("/api/nothing-here");
    assert_eq!(resp.status(), 404);
    assert_eq!(read_json(resp)["error"], json!("Not Found"));
}
