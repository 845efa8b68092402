// src/watcher/watcher.rs
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::backup::BackupManager;
use crate::config::Config;
use crate::db::{last_check, run_migrations, snapshot, Database};
use crate::domain::{self, diff, CheckStatus, Entity, Lists, Timestamp, WatcherStatus};
use crate::errors::ServerError;
use crate::watcher::ModelSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Empty store populated from the first non-empty fetch.
    Seeded { models: usize },
    Unchanged { models: usize },
    Changed { models: usize, changes: usize },
    /// Upstream stayed empty (or errored) through the retry.
    Failed,
}

/// Owns the in-memory view of the store. Readers take point-in-time
/// snapshots through `lists()` / `status()`; writers swap whole values.
pub struct Watcher {
    config: Config,
    db: Database,
    source: Box<dyn ModelSource>,
    lists: ArcSwap<Lists>,
    status: ArcSwap<WatcherStatus>,
    backups: BackupManager,
}

impl Watcher {
    /// Migrates, loads the cache and status, and seeds an empty store.
    /// A migration failure is returned and must abort startup.
    pub fn open(config: Config, source: Box<dyn ModelSource>) -> Result<Self, ServerError> {
        let db = Database::new(&config.db_path);
        let version = run_migrations(&db)?;
        info!(db = %config.db_path.display(), version, "database ready");

        let lists = snapshot::load_lists(&db)?;
        let status = last_check::load_status(&db)?;
        let backups = BackupManager::new(db.clone(), config.backup_path());

        let watcher = Self {
            config,
            db,
            source,
            lists: ArcSwap::from_pointee(lists),
            status: ArcSwap::from_pointee(status),
            backups,
        };

        if watcher.lists.load().models.is_empty() {
            watcher.seed(watcher.fetch_once())?;
        }

        Ok(watcher)
    }

    pub fn lists(&self) -> Arc<Lists> {
        self.lists.load_full()
    }

    pub fn status(&self) -> Arc<WatcherStatus> {
        self.status.load_full()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// One polling cycle. Only the single background loop (or a test) calls this.
    pub fn check(&self) -> Result<CheckOutcome, ServerError> {
        if self.lists.load().models.is_empty() {
            return self.seed(self.fetch_with_retry());
        }

        let started = Instant::now();
        let models = self.fetch_with_retry();
        let now = domain::now();

        if models.is_empty() {
            warn!("upstream returned no models after retry, skipping cycle");
            self.mark_failed(now);
            return Ok(CheckOutcome::Failed);
        }

        let previous = self.lists.load().current_entities();
        let changes = diff(&models, &previous, now);

        let outcome = if changes.is_empty() {
            last_check::record_check(&self.db, now, CheckStatus::Success)?;
            self.update_status(|s| {
                s.api_last_check = Some(now);
                s.api_last_check_status = CheckStatus::Success;
            });
            CheckOutcome::Unchanged {
                models: models.len(),
            }
        } else {
            snapshot::apply_check(&self.db, &models, &changes, now)?;
            self.reload()?;
            self.update_status(|s| {
                s.api_last_check = Some(now);
                s.api_last_check_status = CheckStatus::Success;
                s.db_last_change = Some(now);
            });
            self.backups.trigger();
            CheckOutcome::Changed {
                models: models.len(),
                changes: changes.len(),
            }
        };

        info!(
            ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check complete"
        );
        Ok(outcome)
    }

    /// Writes the first snapshot without change detection.
    fn seed(&self, models: Vec<Entity>) -> Result<CheckOutcome, ServerError> {
        let now = domain::now();

        if models.is_empty() {
            warn!("seeding fetch returned no models, store stays empty");
            self.mark_failed(now);
            return Ok(CheckOutcome::Failed);
        }

        snapshot::seed_snapshot(&self.db, &models, now)?;
        self.reload()?;
        self.update_status(|s| {
            s.api_last_check = Some(now);
            s.api_last_check_status = CheckStatus::Success;
            s.db_last_change = Some(now);
        });

        info!(models = models.len(), "seeded empty store");
        Ok(CheckOutcome::Seeded {
            models: models.len(),
        })
    }

    fn fetch_once(&self) -> Vec<Entity> {
        match self.source.fetch() {
            Ok(models) => models,
            Err(e) => {
                warn!("upstream fetch failed: {e}");
                Vec::new()
            }
        }
    }

    fn fetch_with_retry(&self) -> Vec<Entity> {
        let models = self.fetch_once();
        if !models.is_empty() {
            return models;
        }

        let cooldown = self.config.retry_cooldown;
        info!(cooldown_secs = cooldown.as_secs(), "empty upstream result, retrying once");
        std::thread::sleep(cooldown);
        self.fetch_once()
    }

    /// Failures only touch the in-memory status; the store is left alone.
    fn mark_failed(&self, now: Timestamp) {
        self.update_status(|s| {
            s.api_last_check = Some(now);
            s.api_last_check_status = CheckStatus::Failed;
        });
    }

    fn reload(&self) -> Result<(), ServerError> {
        let lists = snapshot::load_lists(&self.db)?;
        self.lists.store(Arc::new(lists));
        Ok(())
    }

    fn update_status<F>(&self, f: F)
    where
        F: Fn(&mut WatcherStatus),
    {
        self.status.rcu(|current| {
            let mut next = WatcherStatus::clone(current);
            f(&mut next);
            next
        });
    }

    /// Time left until the next scheduled check, zero when overdue.
    pub fn next_check_in(&self, now: Timestamp) -> Duration {
        let interval = self.config.check_interval;
        match self.status.load().api_last_check {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                interval.saturating_sub(elapsed)
            }
        }
    }

    /// Starts the perpetual polling loop on its own thread. The period is
    /// measured from the end of each cycle, so cycles never overlap.
    pub fn spawn_loop(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let watcher = Arc::clone(self);
        std::thread::Builder::new()
            .name("watcher".into())
            .spawn(move || watcher.run_forever())
    }

    fn run_forever(&self) {
        let delay = self.next_check_in(domain::now());
        if !delay.is_zero() {
            info!(delay_secs = delay.as_secs(), "waiting for first scheduled check");
            std::thread::sleep(delay);
        }

        loop {
            if let Err(e) = self.check() {
                error!("check failed: {e}");
            }
            std::thread::sleep(self.config.check_interval);
        }
    }
}
