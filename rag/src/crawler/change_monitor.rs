use super::{
    content_hash, element_text, parse_selector, resolve_url, snippet, CrawlError, Fetcher,
    GACETA_URL, ORGANO_JUDICIAL_URL,
};
use crate::models::{CrawlerStateUpdate, LegalUpdate, NewCrawlerState, UpdateSourceType};
use crate::store::LegalStore;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::{Arc, LazyLock};

pub const GACETA_SOURCE: &str = "Gaceta Oficial";
pub const PUBLICATIONS_SELECTOR: &str =
    ".publicaciones, .gacetas-recientes, .recent-publications, #latest-publications";
/// Selector recorded in `crawler_state` for the publication watch.
const PUBLICATIONS_STATE_SELECTOR: &str = ".publicaciones, .gacetas-recientes";

pub const DEFAULT_SECTION_URL: &str = ORGANO_JUDICIAL_URL;
pub const DEFAULT_SECTION_SELECTOR: &str =
    "div.ultimas-noticias, #ultimas-noticias, .news-section, .noticias";
pub const DEFAULT_SECTION_SOURCE: &str = "Organo Judicial";

const SNIPPET_CHARS: usize = 200;
const TITLE_CHARS: usize = 100;
const REPORTED_PUBLICATIONS: usize = 5;

static PUBLICATION_SECTIONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(PUBLICATIONS_SELECTOR).unwrap());
static PUBLICATION_ITEMS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li, .publication-item, .gaceta-item").unwrap());
static PUBLICATION_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3, h4, .title").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static MAIN_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main, #content, .main-content").unwrap());
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").unwrap());
static TITLE_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".title, .news-title, .headline").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// The watched part of a page, reduced to what gets hashed and reported.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionContent {
    /// Inner HTML of the first matching element; this is what gets hashed.
    pub html: String,
    pub text: String,
    pub title: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationCheck {
    pub source: String,
    pub url: String,
    pub publications_count: usize,
    pub update_detected: bool,
    pub is_first_check: bool,
    pub checked_at: DateTime<Utc>,
    pub publications: Vec<Publication>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCheck {
    pub url: String,
    pub selector: String,
    pub detected_hash: String,
    pub previous_hash: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub update_detected: bool,
    pub is_first_check: bool,
    pub content_snippet: String,
    pub title: String,
    pub links: Vec<String>,
}

/// Recent publications listed on the Gaceta Oficial front page. Falls back
/// to a single entry built from the page title and main content.
pub fn parse_publications(html: &str, page_url: &str, today: NaiveDate) -> Vec<Publication> {
    let document = Html::parse_document(html);
    let mut publications = Vec::new();

    let mut sections = document.select(&PUBLICATION_SECTIONS).peekable();
    if sections.peek().is_none() {
        log::warn!("No recent publications section found on {}", page_url);
    }

    for section in sections {
        for item in section.select(&PUBLICATION_ITEMS) {
            let anchor = item.select(&ANCHOR).next();
            let title = item
                .select(&PUBLICATION_TITLE)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty())
                .or_else(|| anchor.map(element_text).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| format!("Gaceta {}", today.format("%Y-%m-%d")));
            let description = element_text(item);

            let href = anchor
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default();
            let url = if href.is_empty() || href.starts_with("http") {
                href.to_string()
            } else {
                resolve_url(page_url, href).unwrap_or_default()
            };

            if url.is_empty() && description.is_empty() {
                continue;
            }
            publications.push(Publication {
                title,
                description,
                url: if url.is_empty() { page_url.to_string() } else { url },
            });
        }
    }

    if publications.is_empty() {
        let title = document
            .select(&PAGE_TITLE)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| GACETA_SOURCE.to_string());
        let main_content: String = document
            .select(&MAIN_CONTENT)
            .map(|e| e.text().collect::<String>())
            .collect::<String>()
            .trim()
            .to_string();
        publications.push(Publication {
            title,
            description: snippet(&main_content, SNIPPET_CHARS),
            url: page_url.to_string(),
        });
    }

    publications
}

pub fn publications_hash(publications: &[Publication]) -> String {
    let joined = publications
        .iter()
        .map(|p| format!("{}|{}|{}", p.title, p.description, p.url))
        .collect::<Vec<_>>()
        .join("---");
    content_hash(&joined)
}

/// Extracts the elements matching `selector`, or `None` when nothing matches.
pub fn parse_section(
    html: &str,
    selector: &str,
    page_url: &str,
) -> Result<Option<SectionContent>, CrawlError> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let elements: Vec<ElementRef<'_>> = document.select(&selector).collect();
    let Some(first) = elements.first() else {
        return Ok(None);
    };

    let text: String = elements
        .iter()
        .map(|e| e.text().collect::<String>())
        .collect();

    let first_match = |selector: &Selector| {
        elements
            .iter()
            .find_map(|e| e.select(selector).next())
            .map(element_text)
    };
    let title = first_match(&HEADING)
        .or_else(|| first_match(&TITLE_CLASS))
        .unwrap_or_else(|| snippet(text.trim(), TITLE_CHARS));

    let links = elements
        .iter()
        .flat_map(|e| e.select(&ANCHOR))
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
        .filter_map(|href| resolve_url(page_url, href).ok())
        .collect();

    Ok(Some(SectionContent {
        html: first.inner_html(),
        text,
        title,
        links,
    }))
}

struct Observation {
    source_url: String,
    selector: String,
    hash: String,
    snippet: String,
    updates: Vec<LegalUpdate>,
    /// Log failed `legal_updates` inserts instead of failing the check.
    lenient_updates: bool,
}

struct Comparison {
    is_first_check: bool,
    update_detected: bool,
    previous_hash: Option<String>,
}

/// Detects changes on watched pages by comparing SHA-256 hashes with the
/// last state stored in `crawler_state`.
pub struct ChangeMonitor {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn LegalStore>,
    gaceta_url: String,
}

impl ChangeMonitor {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn LegalStore>) -> Self {
        Self {
            fetcher,
            store,
            gaceta_url: GACETA_URL.to_string(),
        }
    }

    pub fn with_gaceta_url(mut self, url: impl Into<String>) -> Self {
        self.gaceta_url = url.into();
        self
    }

    pub async fn check_publications(&self) -> Result<PublicationCheck> {
        let html = self.fetcher.fetch_text(&self.gaceta_url).await?;
        let now = Utc::now();
        let publications = parse_publications(&html, &self.gaceta_url, now.date_naive());

        let updates = publications
            .iter()
            .map(|p| LegalUpdate {
                source: GACETA_SOURCE.to_string(),
                title: p.title.clone(),
                description: p.description.clone(),
                content: None,
                url: p.url.clone(),
                published_at: now,
                source_type: UpdateSourceType::Publication,
                is_new: true,
            })
            .collect();
        let observation = Observation {
            source_url: self.gaceta_url.clone(),
            selector: PUBLICATIONS_STATE_SELECTOR.to_string(),
            hash: publications_hash(&publications),
            snippet: publications
                .first()
                .map(|p| p.description.clone())
                .unwrap_or_default(),
            updates,
            lenient_updates: true,
        };

        let comparison = self.compare_and_store(observation, now).await?;
        log::info!(
            "Checked {}: {} publications, update detected: {}",
            GACETA_SOURCE,
            publications.len(),
            comparison.update_detected
        );

        Ok(PublicationCheck {
            source: GACETA_SOURCE.to_string(),
            url: self.gaceta_url.clone(),
            publications_count: publications.len(),
            update_detected: comparison.update_detected,
            is_first_check: comparison.is_first_check,
            checked_at: now,
            publications: publications.into_iter().take(REPORTED_PUBLICATIONS).collect(),
        })
    }

    /// Watches the part of `url` matched by `selector`. Fails with
    /// [`CrawlError::SelectorNotFound`] when nothing on the page matches.
    pub async fn check_section(
        &self,
        url: &str,
        selector: &str,
        source: &str,
    ) -> Result<SectionCheck> {
        log::info!("Fetching URL: {} with selector: {}", url, selector);
        let html = self.fetcher.fetch_text(url).await?;
        let section = parse_section(&html, selector, url)?.ok_or_else(|| {
            log::warn!("Selector \"{}\" not found on page {}", selector, url);
            CrawlError::SelectorNotFound {
                url: url.to_string(),
                selector: selector.to_string(),
            }
        })?;

        let now = Utc::now();
        let hash = content_hash(&section.html);
        let content_snippet = snippet(&section.text, SNIPPET_CHARS);
        let update_url = section.links.first().cloned().unwrap_or_else(|| url.to_string());
        log::info!(
            "Content found for selector \"{}\": {} characters, hash {}",
            selector,
            section.html.len(),
            hash
        );

        let observation = Observation {
            source_url: url.to_string(),
            selector: selector.to_string(),
            hash: hash.clone(),
            snippet: content_snippet.clone(),
            updates: vec![LegalUpdate {
                source: source.to_string(),
                title: section.title.clone(),
                description: content_snippet.clone(),
                content: Some(section.html),
                url: update_url,
                published_at: now,
                source_type: UpdateSourceType::Website,
                is_new: true,
            }],
            lenient_updates: false,
        };
        let comparison = self.compare_and_store(observation, now).await?;

        Ok(SectionCheck {
            url: url.to_string(),
            selector: selector.to_string(),
            detected_hash: hash,
            previous_hash: comparison.previous_hash,
            checked_at: now,
            update_detected: comparison.update_detected,
            is_first_check: comparison.is_first_check,
            content_snippet,
            title: section.title,
            links: section.links,
        })
    }

    /// First sight inserts state and updates; a new hash refreshes the state
    /// and inserts updates; an unchanged hash only bumps `last_checked_at`.
    async fn compare_and_store(
        &self,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> Result<Comparison> {
        let Some(state) = self.store.crawler_state(&observation.source_url).await? else {
            self.store
                .insert_crawler_state(NewCrawlerState {
                    source_url: observation.source_url.clone(),
                    content_selector: observation.selector,
                    last_content_hash: observation.hash,
                    last_checked_at: now,
                    last_change_content_snippet: observation.snippet,
                })
                .await?;
            self.insert_updates(observation.updates, observation.lenient_updates)
                .await?;
            log::info!("First check for {}", observation.source_url);
            return Ok(Comparison {
                is_first_check: true,
                update_detected: false,
                previous_hash: None,
            });
        };

        let previous_hash = Some(state.last_content_hash.clone());
        if state.last_content_hash == observation.hash {
            self.store
                .update_crawler_state(
                    &state.id,
                    CrawlerStateUpdate {
                        last_checked_at: now,
                        ..Default::default()
                    },
                )
                .await?;
            log::info!("No changes detected on {}", observation.source_url);
            return Ok(Comparison {
                is_first_check: false,
                update_detected: false,
                previous_hash,
            });
        }

        log::info!("Changes detected on {}", observation.source_url);
        self.store
            .update_crawler_state(
                &state.id,
                CrawlerStateUpdate {
                    last_content_hash: Some(observation.hash),
                    last_checked_at: now,
                    update_detected_at: Some(state.update_detected_at.unwrap_or(now)),
                    last_change_content_snippet: Some(observation.snippet),
                },
            )
            .await?;
        self.insert_updates(observation.updates, observation.lenient_updates)
            .await?;

        Ok(Comparison {
            is_first_check: false,
            update_detected: true,
            previous_hash,
        })
    }

    async fn insert_updates(&self, updates: Vec<LegalUpdate>, lenient: bool) -> Result<()> {
        for update in updates {
            let title = update.title.clone();
            match self.store.insert_legal_update(update).await {
                Ok(()) => {}
                Err(e) if lenient => {
                    log::error!("Error inserting legal update \"{}\": {:#}", title, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
