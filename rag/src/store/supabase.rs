use super::{AuthProvider, BlobStorage, LegalStore};
use crate::config::Settings;
use crate::models::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

/// PostgREST, Storage and Auth client for a Supabase project. Table access
/// uses the service-role key, so callers scope rows by user id themselves.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
    anon_key: String,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    #[serde(flatten)]
    params: &'a MatchParams,
}

impl SupabaseClient {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            anon_key: anon_key.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.supabase_url,
            &settings.supabase_service_role_key,
            &settings.supabase_anon_key,
        )
    }

    fn table(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .table(reqwest::Method::GET, table)
            .query(query)
            .send()
            .await?;
        Ok(checked(response, table).await?.json().await?)
    }

    async fn insert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<()> {
        let response = self
            .table(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        checked(response, table).await?;
        Ok(())
    }

    async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<()> {
        let response = self
            .table(reqwest::Method::PATCH, table)
            .query(query)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        checked(response, table).await?;
        Ok(())
    }

    async fn exists(&self, table: &str, url: &str) -> Result<bool> {
        let rows: Vec<serde_json::Value> = self
            .select(
                table,
                &[
                    ("select", "url".to_string()),
                    ("url", format!("eq.{url}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }
}

async fn checked(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    Err(anyhow!("Supabase error on {} ({}): {}", what, status, error_text))
}

#[async_trait]
impl LegalStore for SupabaseClient {
    async fn insert_document(&self, document: NewDocument) -> Result<Document> {
        let response = self
            .table(reqwest::Method::POST, "documents")
            .header("Prefer", "return=representation")
            .json(&document)
            .send()
            .await?;
        let mut rows: Vec<Document> = checked(response, "documents").await?.json().await?;
        rows.pop()
            .ok_or_else(|| anyhow!("Supabase returned no row for the inserted document"))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let mut rows: Vec<Document> = self
            .select("documents", &[("select", "*".to_string()), ("id", format!("eq.{id}"))])
            .await?;
        Ok(rows.pop())
    }

    async fn list_documents(
        &self,
        user_id: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(document_type) = &filter.document_type {
            query.push(("document_type", format!("eq.{document_type}")));
        }
        if let Some(status) = filter.status {
            query.push(("status", format!("eq.{}", status.as_str())));
        }
        self.select("documents", &query).await
    }

    async fn update_document_status(&self, id: &str, update: DocumentStatusUpdate) -> Result<()> {
        self.patch("documents", &[("id", format!("eq.{id}"))], &update).await
    }

    async fn insert_embeddings(&self, rows: Vec<NewEmbedding>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.insert("document_embeddings", &rows).await?;
        Ok(rows.len())
    }

    async fn match_documents(
        &self,
        query_embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<MatchedChunk>> {
        let response = self
            .client
            .post(format!("{}/rest/v1/rpc/match_documents", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&MatchRequest { query_embedding, params })
            .send()
            .await?;
        Ok(checked(response, "match_documents").await?.json().await?)
    }

    async fn insert_source_embeddings(&self, rows: Vec<NewSourceEmbedding>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.insert("gaceta_embeddings", &rows).await?;
        Ok(rows.len())
    }

    async fn pending_deadlines(&self) -> Result<Vec<PendingDeadline>> {
        self.select(
            "legal_deadlines",
            &[
                ("select", "*,cases:case_id(title,user_id)".to_string()),
                ("is_completed", "eq.false".to_string()),
                ("notification_sent", "eq.false".to_string()),
            ],
        )
        .await
    }

    async fn mark_deadlines_notified(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.patch(
            "legal_deadlines",
            &[("id", format!("in.({})", ids.join(",")))],
            &json!({ "notification_sent": true }),
        )
        .await
    }

    async fn insert_notifications(&self, notifications: Vec<NewNotification>) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }
        self.insert("notifications", &notifications).await
    }

    async fn crawler_state(&self, source_url: &str) -> Result<Option<CrawlerState>> {
        let mut rows: Vec<CrawlerState> = self
            .select(
                "crawler_state",
                &[
                    ("select", "*".to_string()),
                    ("source_url", format!("eq.{source_url}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    async fn insert_crawler_state(&self, state: NewCrawlerState) -> Result<()> {
        self.insert("crawler_state", &state).await
    }

    async fn update_crawler_state(&self, id: &str, update: CrawlerStateUpdate) -> Result<()> {
        self.patch("crawler_state", &[("id", format!("eq.{id}"))], &update).await
    }

    async fn insert_legal_update(&self, update: LegalUpdate) -> Result<()> {
        self.insert("legal_updates", &update).await
    }

    async fn gaceta_processed(&self, url: &str) -> Result<bool> {
        self.exists("processed_gacetas", url).await
    }

    async fn record_gaceta(&self, gaceta: ProcessedGaceta) -> Result<()> {
        self.insert("processed_gacetas", &gaceta).await
    }

    async fn fallo_processed(&self, url: &str) -> Result<bool> {
        self.exists("processed_fallos", url).await
    }

    async fn record_fallo(&self, fallo: ProcessedFallo) -> Result<()> {
        self.insert("processed_fallos", &fallo).await
    }
}

#[async_trait]
impl BlobStorage for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        log::info!("Uploading {} bytes to {}/{}", bytes.len(), bucket, path);
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", upsert.to_string())
            .body(bytes)
            .send()
            .await?;
        checked(response, bucket).await?;
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.object_url(bucket, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;
        let bytes = checked(response, bucket).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Ok(Some(checked(response, "auth").await?.json().await?)),
        }
    }
}
