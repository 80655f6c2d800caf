//! Announcement watcher CLI
//!
//! Local execution entry point, meant to be invoked by a scheduler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notice_watcher::{
    error::Result,
    models::{Config, Snapshot},
    pipeline::{self, RunState},
    services::HttpFetcher,
    storage::{LocalSnapshotStore, SnapshotStore},
};

/// notice-watcher - University Announcement Watcher
#[derive(Parser, Debug)]
#[command(
    name = "notice-watcher",
    version,
    about = "Watches a homepage for announcement changes and mails a summary"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the snapshot file from the configuration
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, diff, persist and notify
    Run,

    /// Fetch and report changes without writing or notifying
    Check,

    /// Validate configuration
    Validate,

    /// Show current snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        Config::load_or_default(&cli.config).with_env_overlay(|key| std::env::var(key).ok());
    if let Some(snapshot) = cli.snapshot {
        config.site.snapshot_file = snapshot;
    }

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    log::info!("Watching {} [{}]", config.site.url, config.site.tag);

    let store = LocalSnapshotStore::new(&config.site.snapshot_file);

    match cli.command {
        Command::Run => {
            let fetcher = HttpFetcher::new(&config.fetcher)?;
            let hooks = pipeline::configured_hooks(&config);

            let outcome = match pipeline::run_watch(&config, &fetcher, &store, &hooks, false).await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Run aborted: {}", e);
                    return Err(e);
                }
            };

            match outcome.state {
                RunState::FirstRun => log::info!("Baseline recorded, no notification sent"),
                RunState::Changed => log::info!(
                    "{} change(s) recorded in {}",
                    outcome.diff.change_count(),
                    store.location()
                ),
                RunState::NoChange => log::info!("Snapshot unchanged"),
            }
            for failure in &outcome.hook_failures {
                log::warn!("Hook failure: {}", failure);
            }
        }

        Command::Check => {
            let fetcher = HttpFetcher::new(&config.fetcher)?;
            let outcome = pipeline::run_watch(&config, &fetcher, &store, &[], true).await?;

            if outcome.report.has_change {
                println!("{}", outcome.report.combined());
            } else {
                log::info!("No changes detected");
            }
        }

        Command::Validate => {
            log::info!("✓ Config OK ({} modules)", config.modules.len());
            let missing = config.mail.missing_settings();
            if missing.is_empty() {
                log::info!("✓ Mail settings complete");
            } else {
                log::warn!("Mail settings incomplete: {}", missing.join(", "));
            }
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Snapshot file: {}", store.location());
            if !store.exists().await {
                log::info!("No snapshot found yet.");
            } else {
                let snapshot = store.load().await;
                let configured: Snapshot = config
                    .modules
                    .iter()
                    .map(|m| (m.name.clone(), Vec::new()))
                    .collect();
                for name in pipeline::module_names(&snapshot, &configured) {
                    let note = if config.module(name).is_some() {
                        ""
                    } else {
                        " (no longer configured)"
                    };
                    log::info!(
                        "  {}: {} records{}",
                        name,
                        snapshot.records(name).len(),
                        note
                    );
                }
                log::info!(
                    "Total: {} modules, {} records",
                    snapshot.module_count(),
                    snapshot.record_count()
                );
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
