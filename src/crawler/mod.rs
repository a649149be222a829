//! The crawl collaborator.
//!
//! The execution driver fetches one URL at a time through the `Crawler`
//! trait and assembles the per-job artifact with `report::ResultPageBuilder`.

pub mod http;
pub mod report;

use async_trait::async_trait;

use crate::Result;

pub use http::HttpCrawler;
pub use report::ResultPageBuilder;

/// Fetches and sanitises a single page.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}
