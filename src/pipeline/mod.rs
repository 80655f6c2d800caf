//! Pipeline stages for a watch cycle.
//!
//! - `diff`: per-module added/removed/changed records
//! - `summary`: human-readable report fragments
//! - `notify`: recipient routing and delivery
//! - `hooks`: post-commit actions (mail, git publication)
//! - `run`: the orchestrated cycle

pub mod diff;
pub mod hooks;
pub mod notify;
pub mod run;
pub mod summary;

pub use diff::{Change, DiffCalculator, ModuleDiff, SnapshotDiff, diff_snapshots, module_names};
pub use hooks::{HookContext, NotifyHook, PostCommitHook, PublishHook, configured_hooks};
pub use notify::{Delivery, DeliveryReport, Routing, deliver, plan_deliveries};
pub use run::{RunOutcome, RunState, run_watch};
pub use summary::{Report, ReportFragment, Summarizer};
