// src/tests/router_tests/files_tests.rs
use crate::backup::BackupMode;
use crate::tests::utils::{entities, header, read_body, TestApp};
use flate2::read::GzDecoder;
use serde_json::json;
use std::fs;
use std::io::Read;

fn seeded() -> TestApp {
    TestApp::seeded(entities(vec![json!({"id": "acme/a"})]))
}

#[test]
fn backup_download_is_an_attachment() {
    let t = seeded();
    assert_eq!(t.get("/models.backup.gz").status(), 404);

    t.watcher().backups().run(BackupMode::Rotate).unwrap();

    let mut resp = t.get("/models.backup.gz");
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "Content-Type"), "application/gzip");
    assert_eq!(
        header(&resp, "Content-Disposition"),
        "attachment; filename=\"models.backup.gz\""
    );

    let mut gz = Vec::new();
    resp.body_mut().reader().read_to_end(&mut gz).unwrap();
    let mut db = Vec::new();
    GzDecoder::new(&gz[..]).read_to_end(&mut db).unwrap();
    assert!(db.starts_with(b"SQLite format 3\0"));
}

#[test]
fn static_files_and_index() {
    let t = seeded();
    let root = &t.watcher().config().static_dir;
    fs::create_dir_all(root.join("css")).unwrap();
    fs::write(root.join("index.html"), "<h1>models</h1>").unwrap();
    fs::write(root.join("css/site.css"), "body{}").unwrap();

    let index = t.get("/");
    assert_eq!(index.status(), 200);
    assert!(header(&index, "Content-Type").starts_with("text/html"));
    assert_eq!(read_body(index), "<h1>models</h1>");

    let css = t.get("/css/site.css");
    assert!(header(&css, "Content-Type").starts_with("text/css"));

    assert_eq!(t.get("/missing.js").status(), 404);
}

#[test]
fn static_paths_cannot_escape_root() {
    let t = seeded();
    let root = t.watcher().config().static_dir.clone();
    fs::create_dir_all(&root).unwrap();
    fs::write(t.dir.path().join("secret.txt"), "nope").unwrap();

    let resp = t.get("/../secret.txt");
    assert_eq!(resp.status(), 404);
    assert_eq!(header(&resp, "Content-Type"), "text/plain; charset=utf-8");
}
