//! Actions that run after a snapshot has been persisted.
//!
//! Hooks never affect persistence: a failing hook is logged and reported in
//! the run outcome, and the remaining hooks still run.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::{Config, PublishConfig, Snapshot};
use crate::pipeline::notify::{Routing, deliver, plan_deliveries};
use crate::pipeline::run::RunState;
use crate::pipeline::summary::{Report, subject};
use crate::services::{MailTransport, SmtpMailer};

/// What a hook gets to see about the run.
#[derive(Debug)]
pub struct HookContext<'a> {
    pub state: RunState,
    pub snapshot: &'a Snapshot,
    pub report: &'a Report,
    pub snapshot_path: &'a str,
    pub timestamp: DateTime<Local>,
}

/// An action triggered after a successful commit of the snapshot.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &HookContext<'_>) -> Result<()>;
}

/// Mails the change report to the configured recipients.
pub struct NotifyHook {
    transport: Option<Arc<dyn MailTransport>>,
    routing: Routing,
    tag: String,
}

impl NotifyHook {
    /// `transport` is `None` when mail settings are incomplete; the hook then
    /// only logs what it would have sent.
    pub fn new(transport: Option<Arc<dyn MailTransport>>, routing: Routing, tag: &str) -> Self {
        Self {
            transport,
            routing,
            tag: tag.to_string(),
        }
    }

    /// Build from mail settings.
    ///
    /// Unusable settings disable delivery with a warning and never fail the
    /// run; snapshot tracking goes on without notifications.
    pub fn from_config(config: &Config) -> Self {
        let transport = match SmtpMailer::from_config(&config.mail) {
            Ok(mailer) => mailer.map(|mailer| Arc::new(mailer) as Arc<dyn MailTransport>),
            Err(e) => {
                log::warn!("Mail delivery disabled: {}", e);
                None
            }
        };

        let routing = Routing::from_config(&config.mail);
        if routing.is_empty() {
            log::warn!("No mail recipients configured, changes will not be mailed");
        }

        Self::new(transport, routing, &config.site.tag)
    }

    /// Whether messages can actually be sent.
    pub fn can_deliver(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl PostCommitHook for NotifyHook {
    fn name(&self) -> &str {
        "notify"
    }

    async fn run(&self, ctx: &HookContext<'_>) -> Result<()> {
        // First runs record a baseline without mailing it
        if ctx.state != RunState::Changed {
            return Ok(());
        }

        let subject = subject(&self.tag, &ctx.timestamp);
        let plan = plan_deliveries(ctx.report, &self.routing, &subject);
        if plan.is_empty() {
            log::info!("No recipients configured for the changed modules");
            return Ok(());
        }

        let Some(transport) = &self.transport else {
            log::warn!(
                "Mail transport not configured, skipping {} notification(s)",
                plan.len()
            );
            return Ok(());
        };

        let report = deliver(&plan, transport.as_ref()).await;
        if report.is_success() {
            Ok(())
        } else {
            Err(AppError::hook(
                self.name(),
                format!(
                    "{} of {} message(s) failed",
                    report.failed.len(),
                    plan.len()
                ),
            ))
        }
    }
}

/// Commits the snapshot file with git and pushes it.
#[derive(Debug, Clone)]
pub struct PublishHook {
    remote: Option<String>,
    branch: Option<String>,
    workdir: Option<PathBuf>,
}

impl PublishHook {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            workdir: None,
        }
    }

    /// Run git in the given directory instead of the current one.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn commit_message(timestamp: &DateTime<Local>) -> String {
        format!("update snapshot {}", timestamp.format("%Y-%m-%d %H:%M:%S"))
    }

    fn push_args(&self) -> Vec<&str> {
        let mut args = vec!["push"];
        if let Some(remote) = &self.remote {
            args.push(remote);
            if let Some(branch) = &self.branch {
                args.push(branch);
            }
        }
        args
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| AppError::hook(self.name(), format!("git {}: {}", args[0], e)))?;

        if output.status.success() {
            log::debug!("git {} ok", args.join(" "));
            Ok(())
        } else {
            Err(AppError::hook(
                self.name(),
                format!(
                    "git {} exited with {}: {}",
                    args[0],
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

#[async_trait]
impl PostCommitHook for PublishHook {
    fn name(&self) -> &str {
        "publish"
    }

    async fn run(&self, ctx: &HookContext<'_>) -> Result<()> {
        if ctx.state == RunState::NoChange {
            return Ok(());
        }

        let message = Self::commit_message(&ctx.timestamp);
        self.git(&["add", ctx.snapshot_path]).await?;
        self.git(&["commit", "-m", &message]).await?;
        self.git(&self.push_args()).await?;

        log::info!("Published {}", ctx.snapshot_path);
        Ok(())
    }
}

/// Hooks enabled by the configuration, in execution order.
pub fn configured_hooks(config: &Config) -> Vec<Box<dyn PostCommitHook>> {
    let mut hooks: Vec<Box<dyn PostCommitHook>> =
        vec![Box::new(NotifyHook::from_config(config))];
    if config.publish.enabled {
        hooks.push(Box::new(PublishHook::new(&config.publish)));
    }
    hooks
}
