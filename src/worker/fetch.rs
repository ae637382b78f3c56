use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::config::FetcherConfig;
use super::parse::{self, ParsedFeed};

/// Why fetching a feed failed. The `Display` text ends up in the feed's status message.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
    #[error("{0}")]
    Http(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http status {0}")]
    Status(u16),
    #[error("failed parsing feed: {0}")]
    Parse(String),
}

/// Retrieves and parses one feed URL.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.http_timeout)
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self { client, timeout: cfg.http_timeout })
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() { return FetchError::Timeout(self.timeout); }
        if let Some(status) = e.status() { return FetchError::Status(status.as_u16()); }
        if e.is_builder() { return FetchError::InvalidUrl(e.url().map(|u| u.to_string()).unwrap_or_default()); }
        FetchError::Http(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let body = fetch_body(&self.client, url).await.map_err(|e| self.classify(e))?;
        parse::parse_feed(&body)
    }
}

pub async fn fetch_body(client: &Client, url: &str) -> Result<Bytes, reqwest::Error> {
    let resp = client.get(url).send().await?.error_for_status()?;
    resp.bytes().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title><link>https://example.com/</link><description>d</description>
<item><title>a</title><guid>a</guid></item></channel></rss>"#;

    fn fetcher(timeout: Duration) -> HttpFetcher {
        let cfg = FetcherConfig { http_timeout: timeout, user_agent: "feed-fetcher-test".into(), ..FetcherConfig::default() };
        HttpFetcher::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_parses_with_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/feed")).and(header("user-agent", "feed-fetcher-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server).await;

        let feed = fetcher(Duration::from_secs(5)).fetch(&format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].guid.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server).await;

        let err = fetcher(Duration::from_secs(5)).fetch(&format!("{}/gone", server.uri())).await.unwrap_err();
        assert_eq!(err, FetchError::Status(404));
        assert_eq!(err.to_string(), "http status 404");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS).set_delay(Duration::from_secs(2)))
            .mount(&server).await;

        let err = fetcher(Duration::from_millis(100)).fetch(&format!("{}/slow", server.uri())).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn html_page_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"))
            .mount(&server).await;

        let err = fetcher(Duration::from_secs(5)).fetch(&format!("{}/page", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }
}
