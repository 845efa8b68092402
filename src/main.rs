use crate::api::AppState;
use crate::config::Config;
use crate::watcher::{source_for, Watcher};
use astra::Server;
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod backup;
mod cache;
mod config;
mod db;
mod domain;
mod errors;
mod logging;
mod responses;
mod router;
mod templates;
mod watcher;

#[cfg(test)]
mod tests;

fn main() {
    // 1️⃣ Configuration and logging
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Could not create data directories: {e}");
        std::process::exit(1);
    }
    logging::init_logging(&config.log_file);

    // 2️⃣ Upstream source (fixture list in development)
    let source = match source_for(&config) {
        Ok(source) => source,
        Err(e) => {
            error!("could not build upstream client: {e}");
            std::process::exit(1);
        }
    };

    // 3️⃣ Migrate, load and seed the store; a failed migration is fatal
    let bind_addr = config.bind_addr;
    let workers = config.workers;
    let watcher = match Watcher::open(config, source) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    // 4️⃣ Background work: first backup, then the polling loop
    watcher.backups().trigger_initial();
    if let Err(e) = watcher.spawn_loop() {
        error!("could not start watcher thread: {e}");
        std::process::exit(1);
    }

    // 5️⃣ Serve requests
    let app = AppState::new(watcher);
    info!(%bind_addr, workers, "starting server");

    let result = Server::bind(&bind_addr)
        .max_workers(workers)
        .serve(move |req, _info| router::serve(req, &app));

    if let Err(e) = result {
        error!("server ended with error: {e}");
    }

    info!("server shut down");
}
