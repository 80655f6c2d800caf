// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains the records, snapshots and configuration used
//! throughout the application.

mod config;
mod record;
mod snapshot;

// Re-export all public types
pub use config::{
    CleaningConfig, Config, FetcherConfig, MailConfig, MailSecurity, ModuleConfig, ModuleLocator,
    PublishConfig, ReportConfig, SiteConfig,
};
pub use record::{IdentityPolicy, Record, fingerprint};
pub use snapshot::Snapshot;
