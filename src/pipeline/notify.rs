//! Notification planning and delivery.
//!
//! Planning is pure: a report plus routing yields the exact set of messages.
//! Delivery walks the plan and keeps going past individual failures.

use std::collections::BTreeMap;

use crate::models::MailConfig;
use crate::pipeline::summary::{Report, ReportFragment, compose_body, join_fragments};
use crate::services::{MailTransport, OutgoingMail};

/// One planned message.
pub type Delivery = OutgoingMail;

/// Who receives which module's changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Everyone gets the whole report in one message
    Global(Vec<String>),
    /// Module name to recipients; each recipient gets one aggregated message
    PerModule(BTreeMap<String, Vec<String>>),
}

impl Routing {
    /// Per-module routing when any module list is configured, global otherwise.
    pub fn from_config(config: &MailConfig) -> Self {
        if config.module_recipients.values().any(|to| !to.is_empty()) {
            Self::PerModule(config.module_recipients.clone())
        } else {
            Self::Global(config.recipients.clone())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Global(to) => to.is_empty(),
            Self::PerModule(map) => map.values().all(Vec::is_empty),
        }
    }
}

/// Build the messages for a report. Empty when nothing changed.
pub fn plan_deliveries(report: &Report, routing: &Routing, subject: &str) -> Vec<Delivery> {
    if !report.has_change {
        return Vec::new();
    }

    match routing {
        Routing::Global(to) if to.is_empty() => Vec::new(),
        Routing::Global(to) => vec![OutgoingMail {
            to: to.clone(),
            subject: subject.to_string(),
            body: compose_body(subject, &report.combined()),
        }],
        Routing::PerModule(map) => {
            let mut by_recipient: BTreeMap<&str, Vec<&ReportFragment>> = BTreeMap::new();
            for fragment in &report.fragments {
                let Some(recipients) = map.get(&fragment.module) else {
                    continue;
                };
                for to in recipients {
                    let fragments = by_recipient.entry(to.as_str()).or_default();
                    if !fragments.iter().any(|f| f.module == fragment.module) {
                        fragments.push(fragment);
                    }
                }
            }

            by_recipient
                .into_iter()
                .map(|(to, fragments)| OutgoingMail {
                    to: vec![to.to_string()],
                    subject: subject.to_string(),
                    body: compose_body(subject, &join_fragments(fragments.into_iter())),
                })
                .collect()
        }
    }
}

/// A message that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub to: Vec<String>,
    pub error: String,
}

/// Outcome of delivering a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: Vec<FailedDelivery>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send every planned message; one failure does not stop the others.
pub async fn deliver(plan: &[Delivery], transport: &dyn MailTransport) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for mail in plan {
        match transport.send(mail).await {
            Ok(()) => {
                log::info!("Notification sent to {}", mail.to.join(", "));
                report.sent += 1;
            }
            Err(e) => {
                log::error!("Notification to {} failed: {}", mail.to.join(", "), e);
                report.failed.push(FailedDelivery {
                    to: mail.to.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AppError, Result};

    /// Transport that records messages and fails for listed recipients.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<OutgoingMail>>,
        pub fail_for: Vec<String>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<()> {
            if mail.to.iter().any(|to| self.fail_for.contains(to)) {
                return Err(AppError::notify("connection refused"));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn fragment(module: &str) -> ReportFragment {
        ReportFragment {
            module: module.into(),
            text: format!("Module: {module}"),
        }
    }

    fn report(modules: &[&str]) -> Report {
        Report {
            has_change: !modules.is_empty(),
            fragments: modules.iter().map(|m| fragment(m)).collect(),
        }
    }

    fn per_module(entries: &[(&str, &[&str])]) -> Routing {
        Routing::PerModule(
            entries
                .iter()
                .map(|(m, to)| (m.to_string(), to.iter().map(|s| s.to_string()).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_no_change_plans_nothing() {
        let routing = Routing::Global(vec!["a@x".into()]);
        assert!(plan_deliveries(&report(&[]), &routing, "s").is_empty());
    }

    #[test]
    fn test_global_sends_one_message() {
        let routing = Routing::Global(vec!["a@x".into(), "b@x".into()]);
        let plan = plan_deliveries(&report(&["notices", "events"]), &routing, "subj");

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].to, vec!["a@x", "b@x"]);
        assert_eq!(plan[0].body, "subj\n\nModule: notices\n\nModule: events\n");
    }

    #[test]
    fn test_global_without_recipients_plans_nothing() {
        let plan = plan_deliveries(&report(&["notices"]), &Routing::Global(vec![]), "s");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_per_module_aggregates_by_recipient() {
        let routing = per_module(&[
            ("notices", &["a@x", "b@x"][..]),
            ("events", &["a@x"][..]),
            ("procurement", &["c@x"][..]),
        ]);
        let plan = plan_deliveries(&report(&["notices", "events"]), &routing, "s");

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].to, vec!["a@x"]);
        assert!(plan[0].body.contains("Module: notices"));
        assert!(plan[0].body.contains("Module: events"));
        assert_eq!(plan[1].to, vec!["b@x"]);
        assert!(!plan[1].body.contains("events"));
    }

    #[test]
    fn test_per_module_skips_unrouted_modules() {
        let routing = per_module(&[("notices", &["a@x"][..])]);
        assert!(plan_deliveries(&report(&["events"]), &routing, "s").is_empty());
    }

    #[test]
    fn test_routing_from_config() {
        let mut config = MailConfig {
            recipients: vec!["all@x".into()],
            ..MailConfig::default()
        };
        assert_eq!(Routing::from_config(&config), Routing::Global(vec!["all@x".into()]));

        config
            .module_recipients
            .insert("notices".into(), vec!["n@x".into()]);
        assert!(matches!(Routing::from_config(&config), Routing::PerModule(_)));
    }

    #[tokio::test]
    async fn test_deliver_continues_past_failures() {
        let transport = RecordingTransport {
            fail_for: vec!["a@x".into()],
            ..Default::default()
        };
        let routing = per_module(&[("notices", &["a@x", "b@x"][..])]);
        let plan = plan_deliveries(&report(&["notices"]), &routing, "s");

        let result = deliver(&plan, &transport).await;
        assert_eq!(result.sent, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].to, vec!["a@x"]);
        assert!(!result.is_success());
        assert_eq!(transport.sent.lock().unwrap()[0].to, vec!["b@x"]);
    }
}
