//! Page fetching service.
//!
//! Retrieves the watched page and normalizes it to UTF-8 text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;
use crate::utils::http::{create_async_client, create_legacy_tls_client, decode_body};
use crate::utils::same_origin;

/// Source of raw page documents.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch a document as UTF-8 text.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Degraded TLS client bound to a single origin.
struct LegacyTls {
    origin: String,
    client: Client,
}

/// HTTP implementation of [`PageSource`].
pub struct HttpFetcher {
    client: Client,
    legacy: Option<LegacyTls>,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    /// Create a fetcher from configuration, enabling the legacy TLS
    /// fallback when an origin is configured for it.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let fetcher = Self {
            client: create_async_client(config)?,
            legacy: None,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        };

        match &config.legacy_tls_origin {
            Some(origin) => fetcher.allow_legacy_tls_for(origin, config),
            None => Ok(fetcher),
        }
    }

    /// Allow weakened TLS negotiation for exactly one origin.
    ///
    /// The fallback client lowers the minimum protocol version and skips
    /// certificate and hostname verification. Requests to any other origin
    /// never reach it.
    pub fn allow_legacy_tls_for(mut self, origin: &str, config: &FetcherConfig) -> Result<Self> {
        url::Url::parse(origin)?;
        self.legacy = Some(LegacyTls {
            origin: origin.to_string(),
            client: create_legacy_tls_client(config)?,
        });
        Ok(self)
    }

    fn legacy_client_for(&self, url: &str) -> Option<&Client> {
        self.legacy
            .as_ref()
            .filter(|legacy| same_origin(url, &legacy.origin))
            .map(|legacy| &legacy.client)
    }

    /// The legacy client and the URL to retry, if `error` is a connection
    /// failure on the legacy origin.
    ///
    /// Redirects are followed, so the URL that failed may differ from the
    /// requested one.
    fn legacy_fallback(&self, error: &reqwest::Error, url: &str) -> Option<(&Client, String)> {
        if !error.is_connect() {
            return None;
        }
        let failed_url = error.url().map_or_else(|| url.to_string(), |u| u.to_string());
        let client = self.legacy_client_for(&failed_url)?;
        Some((client, failed_url))
    }

    /// GET with retries on connection-level failures only.
    async fn get_with_retries(
        &self,
        client: &Client,
        url: &str,
    ) -> std::result::Result<String, reqwest::Error> {
        let mut attempt = 0;
        loop {
            match Self::get_once(client, url).await {
                Ok(text) => return Ok(text),
                Err(e) if Self::is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Fetch attempt {} of {} failed for {}: {}",
                        attempt,
                        self.max_retries + 1,
                        url,
                        e
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(client: &Client, url: &str) -> std::result::Result<String, reqwest::Error> {
        let response = client.get(url).send().await?.error_for_status()?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        Ok(decode_body(&headers, &bytes))
    }

    fn is_retryable(error: &reqwest::Error) -> bool {
        !error.is_status() && (error.is_connect() || error.is_timeout())
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("Fetching {}", url);

        let error = match self.get_with_retries(&self.client, url).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        match self.legacy_fallback(&error, url) {
            // Trust exception: the configured origin only offers a weak
            // cipher suite and an unverifiable certificate. The degraded
            // client is used for that origin and nothing else.
            Some((legacy, failed_url)) => {
                log::warn!(
                    "Default TLS negotiation failed for {} ({}); retrying with legacy TLS",
                    failed_url,
                    error
                );
                Self::get_once(legacy, &failed_url)
                    .await
                    .map_err(|e| AppError::fetch(url, e))
            }
            None => Err(AppError::fetch(url, error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            retry_delay_ms: 0,
            timeout_secs: 5,
            ..FetcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_decodes_declared_charset() {
        let server = MockServer::start().await;
        let (body, _, _) = encoding_rs::GBK.encode("<ul><li>通知公告</li></ul>");
        Mock::given(method("GET"))
            .and(path("/main.htm"))
            .and(header("user-agent", FetcherConfig::default().user_agent.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.into_owned())
                    .insert_header("content-type", "text/html; charset=gbk"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let text = fetcher
            .fetch(&format!("{}/main.htm", server.uri()))
            .await
            .unwrap();
        assert!(text.contains("通知公告"));
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let err = fetcher
            .fetch(&format!("{}/main.htm", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_fetch_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{port}/main.htm"))
            .await
            .unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_up_to_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .expect(4)
            .mount(&server)
            .await;

        let config = FetcherConfig {
            timeout_secs: 1,
            max_retries: 3,
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher
            .fetch(&format!("{}/main.htm", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_fetch());
    }

    fn refused_origin() -> String {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn test_legacy_fallback_after_connect_failure_on_bound_origin() {
        let origin = refused_origin();
        let url = format!("{origin}/main.htm");
        let config = FetcherConfig {
            legacy_tls_origin: Some(origin.clone()),
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        let error = HttpFetcher::get_once(&fetcher.client, &url)
            .await
            .unwrap_err();
        assert!(error.is_connect());

        let (_, retry_url) = fetcher.legacy_fallback(&error, &url).unwrap();
        assert_eq!(retry_url, url);

        let unbound = HttpFetcher::new(&test_config()).unwrap();
        assert!(unbound.legacy_fallback(&error, &url).is_none());
    }

    #[tokio::test]
    async fn test_no_legacy_fallback_for_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = FetcherConfig {
            legacy_tls_origin: Some(server.uri()),
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = format!("{}/main.htm", server.uri());

        let error = HttpFetcher::get_once(&fetcher.client, &url)
            .await
            .unwrap_err();
        assert!(error.is_status());
        assert!(fetcher.legacy_fallback(&error, &url).is_none());
        assert!(fetcher.fetch(&url).await.is_err());
    }

    #[test]
    fn test_shipped_config_binds_legacy_tls_to_site() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/nubs.toml");
        let config = crate::models::Config::load(path).unwrap();
        config.validate().unwrap();

        let fetcher = HttpFetcher::new(&config.fetcher).unwrap();
        assert!(fetcher.legacy_client_for(&config.site.url).is_some());
    }

    #[test]
    fn test_legacy_tls_is_scoped_to_one_origin() {
        let mut config = test_config();
        config.legacy_tls_origin = Some("https://nubs.nju.edu.cn".into());
        let fetcher = HttpFetcher::new(&config).unwrap();

        assert!(fetcher
            .legacy_client_for("https://nubs.nju.edu.cn/main.htm")
            .is_some());
        assert!(fetcher
            .legacy_client_for("https://www.nju.edu.cn/main.htm")
            .is_none());
        assert!(fetcher
            .legacy_client_for("http://nubs.nju.edu.cn/main.htm")
            .is_none());
    }

    #[test]
    fn test_no_legacy_tls_by_default() {
        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        assert!(fetcher
            .legacy_client_for("https://nubs.nju.edu.cn/main.htm")
            .is_none());
    }
}
