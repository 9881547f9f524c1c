//! Shelfkeeper: scheduled indexing of comic and e-book archive libraries
//!
//! Libraries are sets of folders scanned on a cron schedule. Each pass keeps
//! a SQLite catalog of titles and chapters in step with what is on disk and
//! records title folders that collide for review.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod indexer;
pub mod jobs;
pub mod services;

pub use app::App;
