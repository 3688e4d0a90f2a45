//! Persistence seams: relational/vector tables, object storage and bearer
//! token auth.
//!
//! [`SupabaseClient`] talks to the hosted project; [`MemoryStore`] keeps
//! everything in process for tests and local runs.

mod memory;
mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseClient;

use crate::models::*;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LegalStore: Send + Sync {
    async fn insert_document(&self, document: NewDocument) -> Result<Document>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    /// A user's documents, newest first.
    async fn list_documents(&self, user_id: &str, filter: &DocumentFilter) -> Result<Vec<Document>>;
    async fn update_document_status(&self, id: &str, update: DocumentStatusUpdate) -> Result<()>;

    /// Fails when the parent document does not exist.
    async fn insert_embeddings(&self, rows: Vec<NewEmbedding>) -> Result<usize>;
    async fn match_documents(
        &self,
        query_embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<MatchedChunk>>;
    async fn insert_source_embeddings(&self, rows: Vec<NewSourceEmbedding>) -> Result<usize>;

    /// Deadlines neither completed nor notified, joined with their case.
    async fn pending_deadlines(&self) -> Result<Vec<PendingDeadline>>;
    async fn mark_deadlines_notified(&self, ids: &[String]) -> Result<()>;
    async fn insert_notifications(&self, notifications: Vec<NewNotification>) -> Result<()>;

    async fn crawler_state(&self, source_url: &str) -> Result<Option<CrawlerState>>;
    async fn insert_crawler_state(&self, state: NewCrawlerState) -> Result<()>;
    async fn update_crawler_state(&self, id: &str, update: CrawlerStateUpdate) -> Result<()>;
    async fn insert_legal_update(&self, update: LegalUpdate) -> Result<()>;

    async fn gaceta_processed(&self, url: &str) -> Result<bool>;
    async fn record_gaceta(&self, gaceta: ProcessedGaceta) -> Result<()>;
    async fn fallo_processed(&self, url: &str) -> Result<bool>;
    async fn record_fallo(&self, fallo: ProcessedFallo) -> Result<()>;
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()>;
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `None` when the token is unknown or expired.
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>>;
}
