//! Human-readable change reports.
//!
//! Each changed module renders to its own fragment so that notification
//! routing can recombine fragments per recipient.

use chrono::{DateTime, TimeZone};

use crate::models::{Record, ReportConfig};
use crate::pipeline::diff::{Change, ModuleDiff, SnapshotDiff};

/// Rendered report block for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFragment {
    pub module: String,
    pub text: String,
}

/// Rendered report for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    /// True iff at least one module has a non-empty diff
    pub has_change: bool,
    /// One fragment per changed module, in module order
    pub fragments: Vec<ReportFragment>,
}

impl Report {
    /// All fragments joined into one text.
    pub fn combined(&self) -> String {
        join_fragments(self.fragments.iter())
    }

    /// Fragment of a module, if it changed.
    pub fn fragment(&self, module: &str) -> Option<&ReportFragment> {
        self.fragments.iter().find(|f| f.module == module)
    }
}

/// Join fragments with a blank line between them.
pub fn join_fragments<'a>(fragments: impl Iterator<Item = &'a ReportFragment>) -> String {
    fragments
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Mail subject carrying the site tag and a readable timestamp.
pub fn subject<Tz: TimeZone>(tag: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] Announcement update ({})",
        tag,
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Mail body: the subject, a blank line, then the report text.
pub fn compose_body(subject: &str, report_text: &str) -> String {
    format!("{subject}\n\n{report_text}\n")
}

/// Renders diffs into report fragments.
#[derive(Debug, Clone)]
pub struct Summarizer {
    max_listed: usize,
}

impl Summarizer {
    pub fn new(config: &ReportConfig) -> Self {
        Self::with_limit(config.max_listed)
    }

    /// Summarizer listing at most `max_listed` items per list.
    pub fn with_limit(max_listed: usize) -> Self {
        Self { max_listed }
    }

    /// Render every changed module.
    pub fn summarize(&self, diff: &SnapshotDiff) -> Report {
        let fragments: Vec<ReportFragment> = diff
            .modules
            .iter()
            .filter(|m| m.has_changes())
            .map(|m| ReportFragment {
                module: m.module.clone(),
                text: self.render(m),
            })
            .collect();

        Report {
            has_change: !fragments.is_empty(),
            fragments,
        }
    }

    fn render(&self, diff: &ModuleDiff) -> String {
        let mut lines = Vec::new();

        match &diff.label {
            Some(label) => lines.push(format!("Module: {} ({})", label, diff.module)),
            None => lines.push(format!("Module: {}", diff.module)),
        }
        lines.push(format!(
            "  {} added, {} removed, {} changed",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len()
        ));

        if !diff.added.is_empty() {
            lines.push(format!("  Added {}:", diff.added.len()));
            self.push_listed(&mut lines, &diff.added, |r| {
                format!("    + {}{}\n        {}", r.title, date_suffix(r), r.url)
            });
        }
        if !diff.removed.is_empty() {
            lines.push(format!("  Removed {}:", diff.removed.len()));
            self.push_listed(&mut lines, &diff.removed, |r| {
                format!("    - {}{}", r.title, date_suffix(r))
            });
        }
        if !diff.changed.is_empty() {
            lines.push(format!("  Changed {}:", diff.changed.len()));
            self.push_listed(&mut lines, &diff.changed, render_change);
        }

        lines.join("\n")
    }

    fn push_listed<T>(&self, lines: &mut Vec<String>, items: &[T], render: impl Fn(&T) -> String) {
        lines.extend(items.iter().take(self.max_listed).map(render));
        if items.len() > self.max_listed {
            lines.push(format!("    ... and {} more", items.len() - self.max_listed));
        }
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(&ReportConfig::default())
    }
}

fn date_suffix(record: &Record) -> String {
    match &record.date {
        Some(date) => format!(" ({date})"),
        None => String::new(),
    }
}

fn render_change(change: &Change) -> String {
    let Change { old, new } = change;
    let title = if old.title == new.title {
        new.title.clone()
    } else {
        format!("{} -> {}", old.title, new.title)
    };
    let date = if old.date == new.date {
        date_suffix(new)
    } else {
        format!(" ({} -> {})", old.date_or_empty(), new.date_or_empty())
    };
    format!("    * {title}{date}\n        {}", new.url)
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn rec(title: &str, n: usize) -> Record {
        Record::new(title, format!("http://x/{n}"), Some("2024-01-01".into()))
    }

    fn module_diff(module: &str, added: Vec<Record>) -> ModuleDiff {
        ModuleDiff {
            module: module.into(),
            added,
            ..ModuleDiff::default()
        }
    }

    #[test]
    fn test_no_change_report_is_empty() {
        let diff = SnapshotDiff {
            modules: vec![module_diff("notices", vec![])],
        };
        let report = Summarizer::default().summarize(&diff);
        assert!(!report.has_change);
        assert!(report.fragments.is_empty());
        assert_eq!(report.combined(), "");
    }

    #[test]
    fn test_fragment_lists_items_with_markers() {
        let mut diff = module_diff("notices", vec![rec("B", 2)]);
        diff.label = Some("通知公告".into());
        diff.removed = vec![Record::new("C", "http://x/3", None)];
        diff.changed = vec![Change {
            old: rec("A", 1),
            new: Record::new("A", "http://x/1", Some("2024-01-02".into())),
        }];

        let report = Summarizer::default().summarize(&SnapshotDiff { modules: vec![diff] });
        assert!(report.has_change);
        assert_eq!(
            report.fragment("notices").unwrap().text,
            "Module: 通知公告 (notices)\n  \
             1 added, 1 removed, 1 changed\n  \
             Added 1:\n    + B (2024-01-01)\n        http://x/2\n  \
             Removed 1:\n    - C\n  \
             Changed 1:\n    * A (2024-01-01 -> 2024-01-02)\n        http://x/1"
        );
    }

    #[test]
    fn test_listing_is_capped_but_counts_are_not() {
        let added = (0..8).map(|i| rec(&format!("N{i}"), i)).collect();
        let diff = SnapshotDiff {
            modules: vec![module_diff("notices", added)],
        };
        let report = Summarizer::with_limit(5).summarize(&diff);
        let text = &report.fragments[0].text;

        assert!(text.contains("8 added"));
        assert!(text.contains("Added 8:"));
        assert_eq!(text.matches("    + ").count(), 5);
        assert!(text.contains("... and 3 more"));
    }

    #[test]
    fn test_fragments_only_for_changed_modules() {
        let diff = SnapshotDiff {
            modules: vec![
                module_diff("latest_updates", vec![rec("A", 1)]),
                module_diff("notices", vec![]),
                module_diff("events", vec![rec("E", 5)]),
            ],
        };
        let report = Summarizer::default().summarize(&diff);
        let modules: Vec<&str> = report.fragments.iter().map(|f| f.module.as_str()).collect();
        assert_eq!(modules, vec!["latest_updates", "events"]);
        assert!(report.combined().contains("\n\nModule: events"));
    }

    #[test]
    fn test_subject_and_body() {
        let at = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 9, 30, 0)
            .unwrap();
        let subject = subject("NUBS", &at);
        assert_eq!(subject, "[NUBS] Announcement update (2024-01-02 09:30:00)");
        assert_eq!(compose_body(&subject, "report"), format!("{subject}\n\nreport\n"));
    }
}
