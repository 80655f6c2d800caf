//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::IdentityPolicy;

/// Root application configuration.
///
/// Built once at startup and passed by reference; nothing below the CLI
/// reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The watched page
    #[serde(default)]
    pub site: SiteConfig,

    /// HTTP behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Monitored modules, in report order
    #[serde(default = "defaults::modules")]
    pub modules: Vec<ModuleConfig>,

    /// Text preprocessing settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Report rendering
    #[serde(default)]
    pub report: ReportConfig,

    /// Mail delivery
    #[serde(default)]
    pub mail: MailConfig,

    /// Snapshot publication through git
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Overlay mail settings from environment-style variables.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn with_env_overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("SMTP_HOST") {
            self.mail.host = Some(host);
        }
        if let Some(port) = non_empty("SMTP_PORT") {
            match port.trim().parse() {
                Ok(port) => self.mail.port = port,
                Err(_) => log::warn!("Ignoring invalid SMTP_PORT value: {}", port),
            }
        }
        if let Some(user) = non_empty("SMTP_USER") {
            self.mail.username = Some(user);
        }
        if let Some(pass) = non_empty("SMTP_PASS") {
            self.mail.password = Some(pass);
        }
        if let Some(from) = non_empty("EMAIL_FROM") {
            self.mail.from = Some(from);
        }
        if self.mail.from.is_none() {
            self.mail.from = self.mail.username.clone();
        }
        if let Some(to) = non_empty("EMAIL_TO") {
            self.mail.recipients = split_addresses(&to);
        }
        for module in &self.modules {
            let key = format!("EMAIL_TO_{}", module.name.to_uppercase());
            if let Some(to) = non_empty(&key) {
                self.mail
                    .module_recipients
                    .insert(module.name.clone(), split_addresses(&to));
            }
        }
        self
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.site.url)
            .map_err(|e| AppError::validation(format!("site.url is invalid: {e}")))?;
        if let Some(origin) = &self.fetcher.legacy_tls_origin {
            url::Url::parse(origin).map_err(|e| {
                AppError::validation(format!("fetcher.legacy_tls_origin is invalid: {e}"))
            })?;
        }
        if self.site.snapshot_file.as_os_str().is_empty() {
            return Err(AppError::validation("site.snapshot_file is empty"));
        }
        if self.modules.is_empty() {
            return Err(AppError::validation("No modules defined"));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                return Err(AppError::validation("Module with empty name"));
            }
            if !seen.insert(module.name.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate module name: {}",
                    module.name
                )));
            }
            module.locator()?;
        }

        for name in self.mail.module_recipients.keys() {
            if !seen.contains(name.as_str()) {
                return Err(AppError::validation(format!(
                    "mail.module_recipients references unknown module: {name}"
                )));
            }
        }
        Ok(())
    }

    /// Module names in configuration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Look up a module by logical name.
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            fetcher: FetcherConfig::default(),
            modules: defaults::modules(),
            cleaning: CleaningConfig::default(),
            report: ReportConfig::default(),
            mail: MailConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

/// The watched page and its persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Page URL, also the base for relative links
    #[serde(default = "defaults::site_url")]
    pub url: String,

    /// Fixed tag placed in the mail subject
    #[serde(default = "defaults::site_tag")]
    pub tag: String,

    /// Snapshot file path
    #[serde(default = "defaults::snapshot_file")]
    pub snapshot_file: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: defaults::site_url(),
            tag: defaults::site_tag(),
            snapshot_file: defaults::snapshot_file(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts after the first one, for connection failures only
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// The one origin allowed to negotiate with weakened TLS
    #[serde(default)]
    pub legacy_tls_origin: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_delay_ms: defaults::retry_delay(),
            legacy_tls_origin: None,
        }
    }
}

/// One monitored content module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Stable logical name, used as snapshot key
    pub name: String,

    /// Human-readable label for reports
    #[serde(default)]
    pub label: Option<String>,

    /// Element id of the module container
    #[serde(default)]
    pub id: Option<String>,

    /// Heading text of a boxed module container
    #[serde(default)]
    pub heading: Option<String>,

    /// Identity key used for deduplication and diffing
    #[serde(default)]
    pub identity: IdentityPolicy,
}

/// Where a module's container lives in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLocator<'a> {
    ElementId(&'a str),
    Heading(&'a str),
}

impl ModuleConfig {
    /// Module located by element id.
    pub fn by_id(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            id: Some(id.to_string()),
            heading: None,
            identity: IdentityPolicy::default(),
        }
    }

    /// Module located by the heading of its box.
    pub fn by_heading(name: &str, heading: &str) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            id: None,
            heading: Some(heading.to_string()),
            identity: IdentityPolicy::default(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_identity(mut self, identity: IdentityPolicy) -> Self {
        self.identity = identity;
        self
    }

    /// Resolve the locator. Exactly one of `id` and `heading` must be set.
    pub fn locator(&self) -> Result<ModuleLocator<'_>> {
        match (self.id.as_deref(), self.heading.as_deref()) {
            (Some(id), None) if !id.trim().is_empty() => Ok(ModuleLocator::ElementId(id.trim())),
            (None, Some(h)) if !h.trim().is_empty() => Ok(ModuleLocator::Heading(h.trim())),
            _ => Err(AppError::validation(format!(
                "module '{}' needs exactly one of `id` or `heading`",
                self.name
            ))),
        }
    }

    /// Label for display, falling back to the logical name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Text cleaning/preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleaningConfig {
    /// Patterns to remove from titles
    #[serde(default)]
    pub title_remove_patterns: Vec<String>,

    /// Patterns to remove from dates
    #[serde(default)]
    pub date_remove_patterns: Vec<String>,
}

impl CleaningConfig {
    fn clean(&self, text: &str, patterns: &[String]) -> String {
        let mut result = Self::normalize_whitespace(text);

        for pattern in patterns {
            result = result.replace(pattern, "");
        }

        result.trim().to_string()
    }

    /// Clean a title string.
    pub fn clean_title(&self, text: &str) -> String {
        self.clean(text, &self.title_remove_patterns)
    }

    /// Clean a date string.
    pub fn clean_date(&self, text: &str) -> String {
        self.clean(text, &self.date_remove_patterns)
    }

    fn normalize_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Items listed per list before truncation
    #[serde(default = "defaults::max_listed")]
    pub max_listed: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_listed: defaults::max_listed(),
        }
    }
}

/// SMTP connection security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailSecurity {
    /// Implicit TLS (SMTPS, usually port 465)
    #[default]
    Tls,
    /// STARTTLS upgrade (usually port 587)
    Starttls,
}

/// Mail delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "defaults::smtp_host")]
    pub host: Option<String>,

    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub security: MailSecurity,

    #[serde(default = "defaults::smtp_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sender address
    #[serde(default)]
    pub from: Option<String>,

    /// Global recipient list
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Per-module recipient lists; when non-empty, replaces the global list
    #[serde(default)]
    pub module_recipients: BTreeMap<String, Vec<String>>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: defaults::smtp_host(),
            port: defaults::smtp_port(),
            security: MailSecurity::default(),
            timeout_secs: defaults::smtp_timeout(),
            username: None,
            password: None,
            from: None,
            recipients: Vec::new(),
            module_recipients: BTreeMap::new(),
        }
    }
}

impl MailConfig {
    /// Names of the settings that are missing for delivery.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        if blank(&self.host) {
            missing.push("host");
        }
        if blank(&self.username) {
            missing.push("username");
        }
        if blank(&self.password) {
            missing.push("password");
        }
        if blank(&self.from) {
            missing.push("from");
        }
        missing
    }
}

/// Snapshot publication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Push target; `git push` defaults apply when unset
    #[serde(default)]
    pub remote: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,
}

fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

mod defaults {
    use std::path::PathBuf;

    use super::ModuleConfig;

    // Site defaults
    pub fn site_url() -> String {
        "http://nubs.nju.edu.cn/main.htm".into()
    }
    pub fn site_tag() -> String {
        "NUBS".into()
    }
    pub fn snapshot_file() -> PathBuf {
        PathBuf::from("nubs_snapshot.json")
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; notice-watcher/1.0)".into()
    }
    pub fn timeout() -> u64 {
        15
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        500
    }

    // Report defaults
    pub fn max_listed() -> usize {
        5
    }

    // Mail defaults
    pub fn smtp_host() -> Option<String> {
        Some("smtp.qq.com".into())
    }
    pub fn smtp_port() -> u16 {
        465
    }
    pub fn smtp_timeout() -> u64 {
        30
    }

    // Module defaults
    pub fn modules() -> Vec<ModuleConfig> {
        vec![
            ModuleConfig::by_id("latest_updates", "wp_news_w46").with_label("最新动态"),
            ModuleConfig::by_id("notices", "wp_news_w47").with_label("通知公告"),
            ModuleConfig::by_id("events", "wp_news_w48").with_label("活动预告"),
            ModuleConfig::by_id("procurement", "wp_news_w100").with_label("招标采购"),
        ]
    }
}
