// src/backup.rs
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::DatabaseName;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::errors::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// Rotate the previous backup and write a new one.
    Rotate,
    /// Write a backup only if none exists yet.
    InitialOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Written,
    Skipped,
}

/// Keeps `{name}.backup` and `{name}.backup.prev`, each with a `.gz` copy.
#[derive(Clone)]
pub struct BackupManager {
    db: Database,
    path: PathBuf,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the backup thread panics.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BackupManager {
    pub fn new(db: Database, path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            path: path.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prev_path(&self) -> PathBuf {
        with_suffix(&self.path, ".prev")
    }

    pub fn gz_path(&self) -> PathBuf {
        with_suffix(&self.path, ".gz")
    }

    pub fn prev_gz_path(&self) -> PathBuf {
        with_suffix(&self.path, ".prev.gz")
    }

    /// Fire-and-forget backup after a change. Returns `None` when one is
    /// already running; callers may join the handle to wait for completion.
    pub fn trigger(&self) -> Option<JoinHandle<()>> {
        self.spawn(BackupMode::Rotate)
    }

    /// Startup backup that leaves an existing one untouched.
    pub fn trigger_initial(&self) -> Option<JoinHandle<()>> {
        self.spawn(BackupMode::InitialOnly)
    }

    fn spawn(&self, mode: BackupMode) -> Option<JoinHandle<()>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(?mode, "backup already in flight, skipping");
            return None;
        }

        let guard = InFlight(self.in_flight.clone());
        let this = self.clone();
        let spawned = std::thread::Builder::new()
            .name("backup".into())
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = this.run(mode) {
                    error!(path = %this.path.display(), "backup failed: {e}");
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                // The closure (and its guard) is dropped, clearing the flag.
                error!("could not spawn backup thread: {e}");
                None
            }
        }
    }

    /// Synchronous backup; the background trigger runs this on its own thread.
    pub fn run(&self, mode: BackupMode) -> Result<BackupOutcome, ServerError> {
        if mode == BackupMode::InitialOnly && self.path.exists() {
            debug!(path = %self.path.display(), "backup exists, skipping initial backup");
            return Ok(BackupOutcome::Skipped);
        }

        let started = Instant::now();
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        self.rotate()?;
        self.snapshot()?;
        self.compress()?;

        info!(
            path = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backup written"
        );
        Ok(BackupOutcome::Written)
    }

    fn rotate(&self) -> Result<(), ServerError> {
        if !self.path.exists() {
            return Ok(());
        }

        let prev = self.prev_path();
        let prev_gz = self.prev_gz_path();
        remove_if_exists(&prev)?;
        remove_if_exists(&prev_gz)?;

        fs::rename(&self.path, &prev)?;
        let gz = self.gz_path();
        if gz.exists() {
            fs::rename(&gz, &prev_gz)?;
        }
        debug!(prev = %prev.display(), "rotated previous backup");
        Ok(())
    }

    /// Consistent copy through SQLite's online backup, renamed into place.
    fn snapshot(&self) -> Result<(), ServerError> {
        let tmp = with_suffix(&self.path, ".tmp");
        remove_if_exists(&tmp)?;

        self.db.with_conn(|conn| {
            conn.backup(DatabaseName::Main, &tmp, None)
                .map_err(|e| ServerError::DbError(format!("online backup failed: {e}")))
        })?;

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn compress(&self) -> Result<(), ServerError> {
        let gz = self.gz_path();
        let tmp = with_suffix(&gz, ".tmp");

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&tmp)?), Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;

        fs::rename(&tmp, &gz)?;
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
