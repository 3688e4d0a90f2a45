use super::{element_text, resolve_url, safe_filename, Fetcher, ORGANO_JUDICIAL_FALLOS_URL};
use crate::models::ProcessedFallo;
use crate::query_service::{RagPipeline, ORGANO_JUDICIAL_BUCKET};
use crate::store::{BlobStorage, LegalStore};
use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::{Arc, LazyLock};

static ITEMS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".fallo-item, .jurisprudencia-item, article.fallo").unwrap()
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3, .title").unwrap());
static DATE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".date, .fecha").unwrap());
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="pdf"], a.download"#).unwrap());
static TRIBUNAL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tribunal, .corte").unwrap());
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".descripcion, .resumen").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FalloListing {
    pub title: String,
    pub date: String,
    pub url: String,
    pub tribunal: String,
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FalloSummary {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FalloRun {
    pub message: String,
    pub fallos: Vec<FalloSummary>,
    #[serde(skip)]
    pub processed: usize,
    #[serde(skip)]
    pub skipped: usize,
    #[serde(skip)]
    pub failed: usize,
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Rulings listed on the jurisprudence page. Items without a title or a
/// document link are skipped.
pub fn parse_fallos(html: &str, page_url: &str) -> Vec<FalloListing> {
    let document = Html::parse_document(html);
    let mut fallos = Vec::new();

    for item in document.select(&ITEMS) {
        let Some(title_element) = item.select(&TITLE).next() else {
            log::info!("Incomplete fallo element, skipping");
            continue;
        };
        let Some(href) = item
            .select(&LINK)
            .next()
            .and_then(|link| link.value().attr("href"))
            .filter(|href| !href.is_empty())
        else {
            log::info!("Fallo element without a document link, skipping");
            continue;
        };

        let url = match resolve_url(page_url, href) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Error processing fallo element: {}", e);
                continue;
            }
        };

        let title = element_text(title_element);
        fallos.push(FalloListing {
            title: if title.is_empty() { "Sin título".to_string() } else { title },
            date: first_text(item, &DATE).unwrap_or_else(|| "Fecha desconocida".to_string()),
            url,
            tribunal: first_text(item, &TRIBUNAL)
                .unwrap_or_else(|| "Tribunal no especificado".to_string()),
            descripcion: first_text(item, &DESCRIPTION),
        });
    }

    log::info!("Parsed {} fallos", fallos.len());
    fallos
}

/// Downloads and embeds new rulings from the Órgano Judicial.
pub struct FalloScraper {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn LegalStore>,
    blobs: Arc<dyn BlobStorage>,
    pipeline: Arc<RagPipeline>,
    page_url: String,
}

impl FalloScraper {
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
            page_url: ORGANO_JUDICIAL_FALLOS_URL.to_string(),
        }
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = page_url.into();
        self
    }

    pub async fn run(&self) -> Result<FalloRun> {
        log::info!("Scraping Órgano Judicial at {}", self.page_url);
        let html = self.fetcher.fetch_text(&self.page_url).await?;
        let fallos = parse_fallos(&html, &self.page_url);
        if fallos.is_empty() {
            return Err(anyhow!("No se encontraron fallos o jurisprudencia para procesar."));
        }

        let mut processed = 0;
        let mut skipped = 0;
        for fallo in &fallos {
            match self.store.fallo_processed(&fallo.url).await {
                Ok(true) => {
                    log::info!("Fallo {} ({}) already processed, skipping", fallo.title, fallo.url);
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("Could not check fallo {}: {:#}", fallo.url, e);
                    continue;
                }
            }

            log::info!("Processing new fallo: {}", fallo.title);
            if let Err(e) = self.process(fallo).await {
                log::error!("Error processing fallo {}: {:#}", fallo.title, e);
                continue;
            }

            let row = ProcessedFallo {
                url: fallo.url.clone(),
                title: fallo.title.clone(),
                tribunal: fallo.tribunal.clone(),
                fallo_date: fallo.date.clone(),
                descripcion: fallo.descripcion.clone(),
            };
            match self.store.record_fallo(row).await {
                Ok(()) => processed += 1,
                Err(e) => log::error!("Could not record fallo {}: {:#}", fallo.url, e),
            }
        }

        let failed = fallos.len() - processed - skipped;
        Ok(FalloRun {
            message: format!(
                "Scraping completado. Procesados {processed} nuevos fallos, {skipped} ya existentes, {failed} con errores."
            ),
            fallos: fallos
                .iter()
                .map(|f| FalloSummary {
                    title: f.title.clone(),
                    url: f.url.clone(),
                })
                .collect(),
            processed,
            skipped,
            failed,
        })
    }

    async fn process(&self, fallo: &FalloListing) -> Result<()> {
        let path = format!("fallos/{}.pdf", safe_filename(&fallo.title));
        let pdf = self.fetcher.fetch_bytes(&fallo.url).await?;

        log::info!("Uploading PDF to bucket '{}' at '{}'", ORGANO_JUDICIAL_BUCKET, path);
        self.blobs
            .upload(ORGANO_JUDICIAL_BUCKET, &path, pdf, "application/pdf", true)
            .await?;

        let outcome = self
            .pipeline
            .ingest_source_pdf(ORGANO_JUDICIAL_BUCKET, &path, &fallo.url)
            .await?;
        log::info!("Embedding outcome for {}: {:?}", fallo.url, outcome);
        Ok(())
    }
}
