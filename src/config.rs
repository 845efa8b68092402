// src/config.rs
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ServerError;

pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/models";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    /// Base name for `{name}.backup`, `{name}.backup.prev` and their `.gz` companions.
    pub backup_name: String,
    pub log_file: PathBuf,
    pub cache_dir: PathBuf,
    pub static_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub upstream_url: String,
    /// Absolute base URL used for links inside the RSS feed.
    pub public_url: String,
    /// Substitutes the bundled fixture list for the live upstream fetch.
    pub development: bool,
    pub workers: usize,

    pub check_interval: Duration,
    /// Wait before the single retry after an empty upstream result.
    pub retry_cooldown: Duration,
    pub fetch_timeout: Duration,
    pub rss_items: usize,
}

impl Config {
    /// Every path hangs off `data_dir` unless overridden explicitly.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join("models.db"),
            backup_dir: data_dir.join("backups"),
            backup_name: "models".to_string(),
            log_file: data_dir.join("watcher.log"),
            cache_dir: data_dir.join("cache"),
            static_dir: PathBuf::from("static"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            public_url: "http://localhost:3000".to_string(),
            development: false,
            workers: 8,
            check_interval: Duration::from_secs(60 * 60),
            retry_cooldown: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
            rss_items: 50,
            data_dir,
        }
    }

    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut cfg = Self::with_data_dir(get("WATCHER_DATA_DIR").unwrap_or_else(|| "data".into()));

        if let Some(v) = get("WATCHER_DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("WATCHER_BACKUP_DIR") {
            cfg.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WATCHER_BACKUP_NAME") {
            cfg.backup_name = v;
        }
        if let Some(v) = get("WATCHER_LOG_FILE") {
            cfg.log_file = PathBuf::from(v);
        }
        if let Some(v) = get("WATCHER_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WATCHER_STATIC_DIR") {
            cfg.static_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WATCHER_BIND_ADDR") {
            cfg.bind_addr = v
                .parse()
                .map_err(|e| ServerError::Config(format!("WATCHER_BIND_ADDR '{v}': {e}")))?;
        }
        if let Some(v) = get("WATCHER_UPSTREAM_URL") {
            cfg.upstream_url = v;
        }
        if let Some(v) = get("WATCHER_PUBLIC_URL") {
            cfg.public_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("WATCHER_DEV") {
            cfg.development = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get("WATCHER_WORKERS") {
            cfg.workers = v
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ServerError::Config(format!("WATCHER_WORKERS '{v}'")))?;
        }

        Ok(cfg)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_dir.join(format!("{}.backup", self.backup_name))
    }

    /// File name of the downloadable compressed backup, e.g. `models.backup.gz`.
    pub fn backup_download_name(&self) -> String {
        format!("{}.backup.gz", self.backup_name)
    }

    pub fn ensure_dirs(&self) -> Result<(), ServerError> {
        let mut dirs: Vec<&Path> = vec![&self.data_dir, &self.backup_dir, &self.cache_dir];
        for file in [&self.db_path, &self.log_file] {
            if let Some(parent) = file.parent() {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir("data")
    }
}
