//! Announcement record data structure.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// How records of one module are identified across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Absolute URL only. Title or date edits show up as changes.
    #[default]
    Url,
    /// Digest of title, URL and date. Any edit is a removal plus an addition.
    Fingerprint,
}

/// One announcement item extracted from a module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Display title
    pub title: String,

    /// Absolute URL of the item
    #[serde(alias = "href")]
    pub url: String,

    /// Display date as shown on the page
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,

    /// Content digest of `title||url||date`
    #[serde(
        default,
        alias = "hash",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub fingerprint: Option<String>,
}

impl Record {
    /// Create a record and compute its fingerprint.
    pub fn new(title: impl Into<String>, url: impl Into<String>, date: Option<String>) -> Self {
        let title = title.into();
        let url = url.into();
        let date = date.filter(|d| !d.is_empty());
        let fingerprint = Some(fingerprint(&title, &url, date.as_deref()));
        Self {
            title,
            url,
            date,
            fingerprint,
        }
    }

    /// The stored fingerprint, or a freshly computed one for legacy records.
    pub fn fingerprint(&self) -> Cow<'_, str> {
        match &self.fingerprint {
            Some(fp) => Cow::Borrowed(fp.as_str()),
            None => Cow::Owned(fingerprint(&self.title, &self.url, self.date.as_deref())),
        }
    }

    /// Identity key under the given policy.
    pub fn identity_key(&self, policy: IdentityPolicy) -> Cow<'_, str> {
        match policy {
            IdentityPolicy::Url => Cow::Borrowed(self.url.as_str()),
            IdentityPolicy::Fingerprint => self.fingerprint(),
        }
    }

    /// Whether the displayed content differs from another version of the item.
    pub fn content_differs(&self, other: &Record) -> bool {
        self.title != other.title || self.date != other.date
    }

    /// Date for display, empty when absent.
    pub fn date_or_empty(&self) -> &str {
        self.date.as_deref().unwrap_or("")
    }
}

/// Hex SHA-256 of `title||url||date`, absent date counted as empty.
pub fn fingerprint(title: &str, url: &str, date: Option<&str>) -> String {
    let key = format!("{}||{}||{}", title, url, date.unwrap_or(""));
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Record::new("A", "http://x/1", Some("2024-01-01".into()));
        let b = Record::new("A", "http://x/1", Some("2024-01-01".into()));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_covers_date() {
        let a = Record::new("A", "http://x/1", Some("2024-01-01".into()));
        let b = Record::new("A", "http://x/1", Some("2024-01-02".into()));
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a.identity_key(IdentityPolicy::Url), b.identity_key(IdentityPolicy::Url));
    }

    #[test]
    fn test_empty_date_is_absent() {
        let r = Record::new("A", "http://x/1", Some(String::new()));
        assert!(r.date.is_none());
        assert_eq!(r.fingerprint(), fingerprint("A", "http://x/1", None));
    }

    #[test]
    fn test_reads_legacy_keys() {
        let json = r#"{"title":"A","href":"http://x/1","date":"","hash":"abc"}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.url, "http://x/1");
        assert_eq!(r.date, None);
        assert_eq!(r.fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_legacy_record_without_hash_computes_fingerprint() {
        let json = r#"{"title":"A","url":"http://x/1"}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.fingerprint(), fingerprint("A", "http://x/1", None));
    }

    #[test]
    fn test_serializes_without_absent_fields() {
        let r = Record {
            title: "A".into(),
            url: "http://x/1".into(),
            date: None,
            fingerprint: None,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"title":"A","url":"http://x/1"}"#);
    }
}
