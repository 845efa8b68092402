// src/logging.rs
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: Once = Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Console + file logging. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(log_file: &Path) {
    LOGGER_INITIALIZED.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let console_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter.clone());

        let dir = log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = log_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "watcher.log".into());

        let file_appender = tracing_appender::rolling::never(dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if let Ok(mut slot) = FILE_APPENDER_GUARD.lock() {
            *slot = Some(guard);
        }

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .init();
    });
}
