//! Batch routes triggered by the scheduler or an external cron, guarded by
//! the job token.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::Utc;
use lexi_rag::crawler::change_monitor::{
    PublicationCheck, SectionCheck, DEFAULT_SECTION_SELECTOR, DEFAULT_SECTION_SOURCE,
    DEFAULT_SECTION_URL,
};
use lexi_rag::crawler::gaceta::GacetaRun;
use lexi_rag::crawler::organo_judicial::FalloRun;
use lexi_rag::crawler::CrawlError;
use lexi_rag::deadlines::MonitorReport;
use lexi_rag::query_service::SourceIngest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingJob {
    pub storage_path: Option<String>,
    pub bucket_name: Option<String>,
    pub gaceta_title: Option<String>,
    pub gaceta_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingJobResult {
    pub message: String,
    pub gaceta_url: String,
}

pub fn ingest_message(outcome: &SourceIngest) -> &'static str {
    match outcome {
        SourceIngest::NoText => "Processed, but no text extracted from PDF.",
        SourceIngest::NoEmbeddings => "Processed, but no embeddings generated.",
        SourceIngest::Stored(_) => "Gaceta processed and embeddings stored successfully.",
    }
}

pub async fn generate_embeddings(
    State(state): State<AppState>,
    body: Result<Json<EmbeddingJob>, JsonRejection>,
) -> ApiResult<Json<EmbeddingJobResult>> {
    let Json(job) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(path), Some(bucket), Some(url)) =
        (job.storage_path, job.bucket_name, job.gaceta_url)
    else {
        return Err(ApiError::bad_request(
            "Missing required parameters: storagePath, bucketName, gacetaUrl",
        ));
    };
    log::info!(
        "Processing request for Gaceta: {} ({})",
        job.gaceta_title.as_deref().unwrap_or("N/A"),
        url
    );

    let outcome = state
        .pipeline
        .ingest_source_pdf(&bucket, &path, &url)
        .await
        .map_err(|e| ApiError::failed(&e))?;

    Ok(Json(EmbeddingJobResult {
        message: ingest_message(&outcome).to_string(),
        gaceta_url: url,
    }))
}

pub async fn monitor_legal_deadlines(
    State(state): State<AppState>,
) -> ApiResult<Json<MonitorReport>> {
    let report = state
        .deadline_monitor()
        .run(Utc::now().date_naive())
        .await
        .map_err(|e| ApiError::failed(&e))?;
    Ok(Json(report))
}

pub async fn cron_scheduler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    log::info!("Running scheduled deadline monitor");
    let report = state
        .deadline_monitor()
        .run(Utc::now().date_naive())
        .await
        .map_err(|e| ApiError::failed(&e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Función de monitoreo ejecutada correctamente",
        "result": report,
    })))
}

pub async fn scrape_gaceta_oficial(State(state): State<AppState>) -> ApiResult<Json<GacetaRun>> {
    let run = state
        .gaceta_scraper()
        .run()
        .await
        .map_err(|e| ApiError::failed(&e))?;
    Ok(Json(run))
}

pub async fn scrape_organo_judicial(State(state): State<AppState>) -> ApiResult<Json<FalloRun>> {
    let run = state
        .fallo_scraper()
        .run()
        .await
        .map_err(|e| ApiError::failed(&e))?;
    Ok(Json(run))
}

pub async fn gaceta_crawler(State(state): State<AppState>) -> ApiResult<Json<PublicationCheck>> {
    let check = state
        .change_monitor()
        .check_publications()
        .await
        .map_err(|e| ApiError::failed(&e))?;
    Ok(Json(check))
}

#[derive(Debug, Default, Deserialize)]
pub struct SectionQuery {
    pub url: Option<String>,
    pub selector: Option<String>,
    pub source: Option<String>,
}

pub async fn legal_crawler(
    State(state): State<AppState>,
    Query(query): Query<SectionQuery>,
) -> ApiResult<Json<SectionCheck>> {
    let url = query.url.unwrap_or_else(|| DEFAULT_SECTION_URL.to_string());
    let selector = query
        .selector
        .unwrap_or_else(|| DEFAULT_SECTION_SELECTOR.to_string());
    let source = query
        .source
        .unwrap_or_else(|| DEFAULT_SECTION_SOURCE.to_string());

    let check = state
        .change_monitor()
        .check_section(&url, &selector, &source)
        .await
        .map_err(|e| match e.downcast_ref::<CrawlError>() {
            Some(CrawlError::SelectorNotFound { url, selector }) => ApiError::SelectorNotFound {
                url: url.clone(),
                selector: selector.clone(),
            },
            _ => ApiError::failed(&e),
        })?;
    Ok(Json(check))
}
