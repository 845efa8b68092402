// src/tests/utils.rs
use crate::api::AppState;
use crate::config::Config;
use crate::domain::Entity;
use crate::router::serve;
use crate::watcher::{FetchError, ModelSource, Watcher};
use astra::{Body, Request, Response};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Hands out queued fetch results in order, then empty lists forever.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    queue: Arc<Mutex<VecDeque<Result<Vec<Entity>, FetchError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, models: Vec<Entity>) -> &Self {
        self.queue.lock().unwrap().push_back(Ok(models));
        self
    }

    pub fn push_err(&self, err: FetchError) -> &Self {
        self.queue.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelSource for ScriptedSource {
    fn fetch(&self) -> Result<Vec<Entity>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

pub fn entities(values: Vec<Value>) -> Vec<Entity> {
    values
        .into_iter()
        .map(|v| Entity::from_value(v).expect("test entity needs an id"))
        .collect()
}

/// Config rooted in a temp dir, with no retry wait.
pub fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::with_data_dir(dir.path());
    config.static_dir = dir.path().join("static");
    config.retry_cooldown = Duration::ZERO;
    config.public_url = "https://watch.test".to_string();
    config.ensure_dirs().expect("create test dirs");
    config
}

/// A watcher plus the app state around it. Keeps the temp dir alive.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub source: ScriptedSource,
    pub app: AppState,
}

impl TestApp {
    /// Opens a watcher whose first fetch (the seed) returns `seed`.
    pub fn seeded(seed: Vec<Entity>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        source.push(seed);
        let watcher = Watcher::open(test_config(&dir), Box::new(source.clone())).unwrap();
        Self {
            dir,
            source,
            app: AppState::new(Arc::new(watcher)),
        }
    }

    pub fn watcher(&self) -> &Watcher {
        &self.app.watcher
    }

    pub fn get(&self, uri: &str) -> Response {
        self.get_with(uri, &[])
    }

    pub fn get_with(&self, uri: &str, headers: &[(&'static str, &str)]) -> Response {
        let mut req = Request::new(Body::empty());
        *req.method_mut() = http::Method::GET;
        *req.uri_mut() = uri.parse().unwrap();
        for (k, v) in headers {
            req.headers_mut().insert(*k, v.parse().unwrap());
        }
        serve(req, &self.app)
    }
}

pub fn read_body(mut resp: Response) -> String {
    let mut out = Vec::new();
    resp.body_mut().reader().read_to_end(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

pub fn read_json(resp: Response) -> Value {
    serde_json::from_str(&read_body(resp)).unwrap()
}

pub fn header(resp: &Response, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Background work (backups) finishes on its own thread; poll for its result.
pub fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    done()
}
