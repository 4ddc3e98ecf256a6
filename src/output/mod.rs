//! Output module for crawl reporting
//!
//! This module handles:
//! - Loading crawl statistics from the database
//! - Printing them for the `--stats` CLI mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
