//! One watch cycle: fetch, extract, diff, summarize, persist, then hooks.

use chrono::Local;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::diff::{SnapshotDiff, diff_snapshots};
use crate::pipeline::hooks::{HookContext, PostCommitHook};
use crate::pipeline::summary::{Report, Summarizer};
use crate::services::{ModuleExtractor, PageSource};
use crate::storage::SnapshotStore;

/// How a run classified the fetched page against the stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No usable prior snapshot; the fetched one becomes the baseline
    FirstRun,
    Changed,
    NoChange,
}

/// Result of one watch cycle.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub diff: SnapshotDiff,
    pub report: Report,
    /// Whether the snapshot file was rewritten
    pub persisted: bool,
    /// `hook: error` for every hook that failed
    pub hook_failures: Vec<String>,
}

/// Run one watch cycle.
///
/// Only a fetch failure aborts the run, and it does so before anything is
/// loaded or written. With `dry_run` the cycle stops after summarizing.
pub async fn run_watch(
    config: &Config,
    source: &dyn PageSource,
    store: &dyn SnapshotStore,
    hooks: &[Box<dyn PostCommitHook>],
    dry_run: bool,
) -> Result<RunOutcome> {
    let url = config.site.url.as_str();
    log::info!("Fetching {}", url);

    let html = source.fetch(url).await.map_err(|e| {
        if e.is_fetch() {
            e
        } else {
            AppError::fetch(url, e)
        }
    })?;

    let extractor = ModuleExtractor::new(url, config.cleaning.clone())?;
    let current = extractor.extract_all(&html, &config.modules)?;
    let previous = store.load().await;

    let diff = diff_snapshots(&previous, &current, &config.modules);
    let report = Summarizer::new(&config.report).summarize(&diff);

    let state = if previous.is_empty() {
        RunState::FirstRun
    } else if report.has_change {
        RunState::Changed
    } else {
        RunState::NoChange
    };

    let mut outcome = RunOutcome {
        state,
        diff,
        report,
        persisted: false,
        hook_failures: Vec::new(),
    };

    match state {
        RunState::NoChange => {
            log::info!("No changes detected");
            return Ok(outcome);
        }
        RunState::FirstRun => log::info!(
            "No previous snapshot, recording baseline of {} records",
            current.record_count()
        ),
        RunState::Changed => log::info!(
            "Detected {} change(s) across {} module(s)",
            outcome.diff.change_count(),
            outcome.report.fragments.len()
        ),
    }

    if dry_run {
        log::info!("Dry run, leaving {} untouched", store.location());
        return Ok(outcome);
    }

    store.save(&current).await?;
    outcome.persisted = true;

    let location = store.location();
    let ctx = HookContext {
        state,
        snapshot: &current,
        report: &outcome.report,
        snapshot_path: &location,
        timestamp: Local::now(),
    };

    let mut failures = Vec::new();
    for hook in hooks {
        if let Err(e) = hook.run(&ctx).await {
            log::error!("Hook '{}' failed: {}", hook.name(), e);
            failures.push(format!("{}: {}", hook.name(), e));
        }
    }
    outcome.hook_failures = failures;

    Ok(outcome)
}
