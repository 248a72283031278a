//! Noticeboard - feed ingestion for an announcement board
//!
//! Fetches operator-registered RSS/Atom feeds on a schedule and stores their
//! items for display, guarding every outbound request against SSRF.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod logging;
pub mod rss;

pub use config::Config;
pub use db::Database;
pub use error::{NoticeboardError, Result};
