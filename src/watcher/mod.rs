mod fetch_error;
mod source;
mod watcher;

pub use fetch_error::FetchError;
pub use source::{source_for, ModelSource};
pub use watcher::Watcher;
#[cfg(test)]
pub use watcher::CheckOutcome;
