//! Release discovery via saved search queries
//!
//! Fetches the discovery site's listing page for a saved query and scrapes
//! every magnet link out of it. Candidate locators are returned in page
//! order; the dedup ledger decides what actually gets fetched.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

/// Source of candidate release locators for a saved query.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// Discovery client scraping magnet links from an HTML listing.
pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DiscoveryClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }
}

/// Collect every `magnet:` href from a listing page, deduplicated in page
/// order.
fn extract_magnet_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    // static selector, cannot fail to parse
    let anchors = Selector::parse("a[href]").expect("valid selector");

    let mut seen = std::collections::HashSet::new();
    let mut magnets = Vec::new();
    for anchor in document.select(&anchors) {
        if let Some(href) = anchor.value().attr("href") {
            if href.starts_with("magnet:") && seen.insert(href.to_string()) {
                magnets.push(href.to_string());
            }
        }
    }
    magnets
}

#[async_trait]
impl ReleaseSource for DiscoveryClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await
            .with_context(|| format!("Discovery request failed for query '{}'", query))?
            .error_for_status()
            .context("Discovery listing returned an error status")?;

        let body = response.text().await.context("Failed to read listing body")?;
        let magnets = extract_magnet_links(&body);
        debug!(query = %query, candidates = magnets.len(), "Discovery search complete");
        Ok(magnets)
    }
}
