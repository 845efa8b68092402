pub mod connection;
pub mod last_check;
pub mod migrations;
pub mod snapshot;

pub use connection::Database;
pub use migrations::run_migrations;
