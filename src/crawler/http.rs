//! HTTP crawler implementation.

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::Crawler;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches pages with a shared client and strips active content before the
/// HTML enters the result artifact.
pub struct HttpCrawler {
    client: reqwest::Client,
    script_re: Regex,
    style_re: Regex,
}

impl HttpCrawler {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {e}")))?;

        let script_re = Regex::new(r"(?is)<script\b[^>]*>.*?</script>")
            .map_err(|e| Error::internal(format!("Invalid sanitiser pattern: {e}")))?;
        let style_re = Regex::new(r"(?is)<style\b[^>]*>.*?</style>")
            .map_err(|e| Error::internal(format!("Invalid sanitiser pattern: {e}")))?;

        Ok(Self {
            client,
            script_re,
            style_re,
        })
    }

    fn sanitize(&self, html: &str) -> String {
        let without_scripts = self.script_re.replace_all(html, "");
        self.style_re.replace_all(&without_scripts, "").into_owned()
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "Fetching page");

        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| Error::Crawl(format!("Request to {url} failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(Error::Crawl(format!(
                "HTTP request failed with status code: {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Crawl(format!("Failed to read body from {url}: {e}")))?;

        Ok(self.sanitize(&body))
    }
}
