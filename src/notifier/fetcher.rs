//! Topic listing fetcher.
//!
//! Retrieves a topic's listing page and extracts one [`Document`] per
//! listing entry using CSS selectors.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::document::Document;
use crate::config::FetchConfig;
use crate::db::Topic;
use crate::{NotifierError, Result};

/// Source of a topic's current document listing.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current listing of a topic, in source order.
    async fn fetch(&self, topic: &Topic) -> Result<Vec<Document>>;
}

/// Compiled selectors describing the listing markup.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    entry: Selector,
    symbol: Selector,
    title: Selector,
}

impl ListingSelectors {
    /// Compile the selectors from configuration.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            entry: parse_selector(&config.entry_selector)?,
            symbol: parse_selector(&config.symbol_selector)?,
            title: parse_selector(&config.title_selector)?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| NotifierError::Config(format!("invalid selector {s:?}: {e:?}")))
}

/// HTTP fetcher for HTML document listings.
pub struct HttpFetcher {
    client: Client,
    selectors: ListingSelectors,
    language: String,
    max_body_bytes: u64,
    check_hosts: bool,
}

impl HttpFetcher {
    /// Create a fetcher; `timeout` bounds each whole request.
    pub fn new(config: &FetchConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            selectors: ListingSelectors::from_config(config)?,
            language: config.title_language.clone(),
            max_body_bytes: config.max_body_bytes,
            check_hosts: true,
        })
    }

    /// Skip the host check so tests can fetch from a local server.
    #[cfg(test)]
    fn allow_internal_hosts(mut self) -> Self {
        self.check_hosts = false;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, topic: &Topic) -> Result<Vec<Document>> {
        if self.check_hosts {
            validate_url(&topic.url)?;
        }

        let response = self
            .client
            .get(&topic.url)
            .send()
            .await
            .map_err(|e| NotifierError::Fetch(format!("failed to fetch {}: {e}", topic.url)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Fetch(format!(
                "HTTP error from {}: {}",
                topic.url,
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_body_bytes {
                return Err(NotifierError::Fetch(format!(
                    "listing too large: {} bytes (max {} bytes)",
                    content_length, self.max_body_bytes
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| NotifierError::Fetch(format!("failed to read response: {e}")))?;

        if bytes.len() as u64 > self.max_body_bytes {
            return Err(NotifierError::Fetch(format!(
                "listing too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_body_bytes
            )));
        }

        let body = String::from_utf8_lossy(&bytes);
        let documents = parse_listing(&body, &self.selectors, &self.language);
        debug!(
            "Fetched {} document(s) from topic {}",
            documents.len(),
            topic.name
        );
        Ok(documents)
    }
}

/// Extract documents from listing markup.
///
/// Entries without a symbol or title are skipped.
pub fn parse_listing(html: &str, selectors: &ListingSelectors, language: &str) -> Vec<Document> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.entry)
        .filter_map(|entry| {
            let symbol = first_text(&entry, &selectors.symbol)?;
            let title = first_text(&entry, &selectors.title)?;
            Some(Document::new(symbol, language, title))
        })
        .collect()
}

fn first_text(entry: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = entry.select(selector).next()?;
    let text = normalize_whitespace(&element.text().collect::<String>());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate a topic URL.
///
/// Only http and https are accepted, and the host must not be a loopback,
/// private, link-local or otherwise internal address.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| NotifierError::Validation(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(NotifierError::Validation(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| NotifierError::Validation("URL has no host".to_string()))?;

    let forbidden = match host {
        url::Host::Domain(domain) => is_forbidden_hostname(domain),
        url::Host::Ipv4(ip) => is_internal_ip(&IpAddr::V4(ip)),
        url::Host::Ipv6(ip) => is_internal_ip(&IpAddr::V6(ip)),
    };

    if forbidden {
        return Err(NotifierError::Validation(format!("forbidden host: {host}")));
    }
    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    host == "localhost"
        || [".local", ".localhost", ".internal", ".lan"]
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}
