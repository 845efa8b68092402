pub mod rss;

pub use rss::{rss_feed, FeedInfo};
