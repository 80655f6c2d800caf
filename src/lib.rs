// src/lib.rs

//! Announcement watcher library
//!
//! Fetches a homepage, extracts its announcement modules, diffs them against
//! the last stored snapshot, and notifies subscribers about changes.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
