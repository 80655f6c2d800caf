// src/utils/http.rs

//! HTTP client utilities.

use std::sync::OnceLock;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

use crate::error::Result;
use crate::models::FetcherConfig;

/// Create the default asynchronous HTTP client.
pub fn create_async_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .use_rustls_tls()
        .build()?;
    Ok(client)
}

/// Create the degraded client for an origin with a broken TLS setup.
///
/// Accepts TLS 1.0 and skips certificate and hostname checks. Only
/// `HttpFetcher` builds this, and only for its configured legacy origin.
///
/// The native backend exposes no cipher-string control, so the system
/// OpenSSL security level still applies. Servers that only offer ciphers
/// below that level (`SECLEVEL=1` territory) will keep failing here.
pub(crate) fn create_legacy_tls_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .use_native_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_0)
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(client)
}

/// Decode a response body into UTF-8.
///
/// The charset comes from the Content-Type header, then from a `<meta>`
/// declaration in the first 1024 bytes, then defaults to UTF-8.
pub fn decode_body(headers: &HeaderMap, bytes: &[u8]) -> String {
    let encoding = header_charset(headers)
        .or_else(|| sniff_meta_charset(bytes))
        .unwrap_or(UTF_8);
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::debug!("Body contained malformed {} sequences", actual.name());
    }
    text.into_owned()
}

fn header_charset(headers: &HeaderMap) -> Option<&'static Encoding> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Encoding::for_label(value.trim().trim_matches('"').as_bytes()))
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    static META_CHARSET: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = META_CHARSET
        .get_or_init(|| Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-:.]+)"#).ok())
        .as_ref()?;

    let head = &bytes[..bytes.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    let label = pattern.captures(&head)?.get(1)?.as_str().to_string();
    Encoding::for_label(label.as_bytes())
}
