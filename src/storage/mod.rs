//! Storage abstractions for snapshot persistence.
//!
//! The snapshot file is a pretty-printed JSON object keyed by module name:
//!
//! ```text
//! {
//!   "events": [],
//!   "notices": [
//!     { "title": "...", "url": "...", "date": "2024-01-01", "fingerprint": "..." }
//!   ]
//! }
//! ```
//!
//! Its history doubles as an audit trail, so it is only rewritten when the
//! content actually changed.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Snapshot;

// Re-export for convenience
pub use local::LocalSnapshotStore;

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last persisted snapshot.
    ///
    /// Missing or unreadable state yields an empty snapshot, never an error.
    async fn load(&self) -> Snapshot;

    /// Persist a snapshot, replacing the previous one atomically.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Human-readable location of the stored snapshot.
    fn location(&self) -> String;
}
