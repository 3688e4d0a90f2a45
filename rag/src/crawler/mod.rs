//! Scrapers for Panamanian official sources and a hash-based page change
//! monitor.
//!
//! HTML is parsed inside synchronous helpers: `scraper::Html` is not `Send`
//! and must not be held across an `.await`.

pub mod change_monitor;
pub mod gaceta;
pub mod organo_judicial;

pub use change_monitor::ChangeMonitor;
pub use gaceta::GacetaScraper;
pub use organo_judicial::FalloScraper;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Selector};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

pub const GACETA_URL: &str = "https://www.gacetaoficial.gob.pa/";
pub const ORGANO_JUDICIAL_URL: &str = "https://www.organojudicial.gob.pa/";
pub const ORGANO_JUDICIAL_FALLOS_URL: &str = "https://www.organojudicial.gob.pa/fallos/jurisprudencia";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[^a-z0-9_\-.]").unwrap());

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP error fetching {url}: status {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Content selector \"{selector}\" not found on page {url}")]
    SelectorNotFound { url: String, selector: String },

    #[error("invalid CSS selector \"{0}\"")]
    InvalidSelector(String),

    #[error("invalid URL \"{0}\"")]
    InvalidUrl(String),
}

/// Source of remote pages and files.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, CrawlError> {
        log::info!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            log::error!("Failed to fetch {}: {}", url, status);
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} ({:.2} KB)", url, bytes.len() as f64 / 1024.0);
        Ok(bytes.to_vec())
    }
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn safe_filename(title: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(title, "_").into_owned()
}

pub fn resolve_url(base: &str, href: &str) -> Result<String, CrawlError> {
    let base = Url::parse(base).map_err(|_| CrawlError::InvalidUrl(base.to_string()))?;
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|_| CrawlError::InvalidUrl(href.to_string()))
}

pub fn parse_selector(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector).map_err(|_| CrawlError::InvalidSelector(selector.to_string()))
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn snippet(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_keep_only_safe_characters() {
        assert_eq!(safe_filename("GACETA 30262"), "GACETA_30262");
        assert_eq!(safe_filename("Fallo: 12/2024 (Sala Tercera)"), "Fallo__12_2024__Sala_Tercera_");
        assert_eq!(safe_filename("Resolución-1.v2"), "Resoluci_n-1.v2");
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn relative_links_are_resolved_against_the_page() {
        assert_eq!(
            resolve_url(GACETA_URL, "/pdfTemp/30262/GacetaNo_30262.pdf").unwrap(),
            "https://www.gacetaoficial.gob.pa/pdfTemp/30262/GacetaNo_30262.pdf"
        );
        assert_eq!(
            resolve_url(ORGANO_JUDICIAL_FALLOS_URL, "docs/f1.pdf").unwrap(),
            "https://www.organojudicial.gob.pa/fallos/docs/f1.pdf"
        );
        assert!(matches!(
            resolve_url("not a url", "x"),
            Err(CrawlError::InvalidUrl(_))
        ));
    }

    #[test]
    fn snippet_marks_truncation() {
        assert_eq!(snippet("corto", 200), "corto");
        assert_eq!(snippet("abcdef", 3), "abc...");
    }
}
