//! trophycase - a CLI achievement tracker for your personal game library
//!
//! This crate tracks achievement-unlock state for a local game library:
//! - Versioned, transactional SQLite schema migrations
//! - A persistent store for games, achievements and user settings
//! - Additive-only reconciliation of the remote Steam snapshot
//! - Live unlock detection from a per-game sidecar feed, deduplicated
//!   so each unique unlock is surfaced at most once per session

pub const APP_VERSION: &str = "0.1.0";

pub mod app;
pub mod config;
pub mod db;
pub mod steam;
pub mod sync;
pub mod watch;

pub use app::App;
pub use config::Config;
