use super::{element_text, resolve_url, safe_filename, Fetcher, GACETA_URL};
use crate::models::ProcessedGaceta;
use crate::query_service::RagPipeline;
use crate::store::{BlobStorage, LegalStore};
use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::{Arc, LazyLock};

pub const GACETA_BUCKET: &str = "gacetas-pdf";

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.noGaceta h2.upper a").unwrap());
static DATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.noGaceta h2.upper + span").unwrap());

/// Latest issue as announced on the Gaceta Oficial front page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GacetaListing {
    /// e.g. "GACETA 30262"
    pub title: String,
    /// e.g. "martes 22 de abril de 2025"
    pub date: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GacetaRun {
    pub message: String,
    pub latest_gaceta: GacetaListing,
    #[serde(skip)]
    pub recorded: bool,
}

pub fn parse_latest_gaceta(html: &str, page_url: &str) -> Result<Option<GacetaListing>> {
    let document = Html::parse_document(html);
    let link = document.select(&LINK).next();
    let date = document.select(&DATE).next();

    let (Some(link), Some(date)) = (link, date) else {
        log::error!(
            "Could not find the Gaceta elements (link found: {}, date found: {})",
            link.is_some(),
            date.is_some()
        );
        return Ok(None);
    };

    let title = element_text(link);
    let date = element_text(date);
    let href = link.value().attr("href").unwrap_or_default();
    if title.is_empty() || date.is_empty() || href.is_empty() {
        log::error!(
            "Failed to extract Gaceta data. Title: {:?}, date: {:?}, href: {:?}",
            title,
            date,
            href
        );
        return Ok(None);
    }

    Ok(Some(GacetaListing {
        title,
        date,
        url: resolve_url(page_url, href)?,
    }))
}

/// Picks up the newest Gaceta Oficial issue, stores its PDF and embeds it.
pub struct GacetaScraper {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn LegalStore>,
    blobs: Arc<dyn BlobStorage>,
    pipeline: Arc<RagPipeline>,
    page_url: String,
}

impl GacetaScraper {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn LegalStore>,
        blobs: Arc<dyn BlobStorage>,
        pipeline: Arc<RagPipeline>,
    ) -> Self {
        Self {
            fetcher,
            store,
            blobs,
            pipeline,
            page_url: GACETA_URL.to_string(),
        }
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = page_url.into();
        self
    }

    pub async fn run(&self) -> Result<GacetaRun> {
        log::info!("Scraping Gaceta Oficial at {}", self.page_url);
        let html = self.fetcher.fetch_text(&self.page_url).await?;
        let latest = parse_latest_gaceta(&html, &self.page_url)?
            .ok_or_else(|| anyhow!("Scraping failed to find or extract Gaceta info."))?;
        log::info!("Found Gaceta: {}, date: {}, URL: {}", latest.title, latest.date, latest.url);

        if self.store.gaceta_processed(&latest.url).await? {
            log::info!("Gaceta {} ({}) already processed", latest.title, latest.url);
            return Ok(GacetaRun {
                message: "No new Gaceta found.".to_string(),
                latest_gaceta: latest,
                recorded: false,
            });
        }

        log::info!("New Gaceta found: {}", latest.title);
        let recorded = match self.process(&latest).await {
            Ok(()) => self.record(&latest).await,
            Err(e) => {
                log::error!("Error processing new Gaceta {}: {:#}", latest.title, e);
                false
            }
        };

        Ok(GacetaRun {
            message: "New Gaceta found and processing initiated (or logged).".to_string(),
            latest_gaceta: latest,
            recorded,
        })
    }

    async fn process(&self, gaceta: &GacetaListing) -> Result<()> {
        let path = format!("public/{}.pdf", safe_filename(&gaceta.title));
        let pdf = self.fetcher.fetch_bytes(&gaceta.url).await?;

        log::info!("Uploading PDF to bucket '{}' at '{}'", GACETA_BUCKET, path);
        self.blobs
            .upload(GACETA_BUCKET, &path, pdf, "application/pdf", true)
            .await?;

        let outcome = self
            .pipeline
            .ingest_source_pdf(GACETA_BUCKET, &path, &gaceta.url)
            .await?;
        log::info!("Embedding outcome for {}: {:?}", gaceta.url, outcome);
        Ok(())
    }

    /// A failed insert is logged; the scrape itself still counts as done.
    async fn record(&self, gaceta: &GacetaListing) -> bool {
        let row = ProcessedGaceta {
            url: gaceta.url.clone(),
            title: gaceta.title.clone(),
            gaceta_date: gaceta.date.clone(),
        };
        match self.store.record_gaceta(row).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Could not record Gaceta {}: {:#}", gaceta.url, e);
                false
            }
        }
    }
}
