use super::{AuthProvider, BlobStorage, LegalStore};
use crate::embedding_service::cosine_similarity;
use crate::models::*;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    documents: Vec<Document>,
    embeddings: Vec<DocumentEmbedding>,
    source_embeddings: Vec<NewSourceEmbedding>,
    deadlines: Vec<PendingDeadline>,
    notifications: Vec<Notification>,
    crawler_states: Vec<CrawlerState>,
    legal_updates: Vec<LegalUpdate>,
    gacetas: Vec<ProcessedGaceta>,
    fallos: Vec<ProcessedFallo>,
    blobs: HashMap<(String, String), Vec<u8>>,
    tokens: HashMap<String, AuthUser>,
    legal_updates_unavailable: bool,
}

/// In-process implementation of every store seam.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Registers a bearer token for [`AuthProvider::user_for_token`].
    pub fn add_user(&self, token: &str, user: AuthUser) -> Result<()> {
        self.write()?.tokens.insert(token.to_string(), user);
        Ok(())
    }

    pub fn add_deadline(&self, deadline: PendingDeadline) -> Result<()> {
        self.write()?.deadlines.push(deadline);
        Ok(())
    }

    pub fn deadlines(&self) -> Result<Vec<PendingDeadline>> {
        Ok(self.read()?.deadlines.clone())
    }

    pub fn notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.read()?.notifications.clone())
    }

    pub fn embeddings_for(&self, document_id: &str) -> Result<Vec<DocumentEmbedding>> {
        Ok(self
            .read()?
            .embeddings
            .iter()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect())
    }

    pub fn source_embeddings(&self) -> Result<Vec<NewSourceEmbedding>> {
        Ok(self.read()?.source_embeddings.clone())
    }

    /// Makes every later `insert_legal_update` fail, as a broken
    /// `legal_updates` table would.
    pub fn fail_legal_update_inserts(&self) -> Result<()> {
        self.write()?.legal_updates_unavailable = true;
        Ok(())
    }

    pub fn legal_updates(&self) -> Result<Vec<LegalUpdate>> {
        Ok(self.read()?.legal_updates.clone())
    }

    pub fn crawler_states(&self) -> Result<Vec<CrawlerState>> {
        Ok(self.read()?.crawler_states.clone())
    }

    pub fn processed_gacetas(&self) -> Result<Vec<ProcessedGaceta>> {
        Ok(self.read()?.gacetas.clone())
    }

    pub fn processed_fallos(&self) -> Result<Vec<ProcessedFallo>> {
        Ok(self.read()?.fallos.clone())
    }

    pub fn blob(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .read()?
            .blobs
            .get(&(bucket.to_string(), path.to_string()))
            .cloned())
    }
}

#[async_trait]
impl LegalStore for MemoryStore {
    async fn insert_document(&self, document: NewDocument) -> Result<Document> {
        let row = Document {
            id: Uuid::new_v4().to_string(),
            user_id: document.user_id,
            file_name: document.file_name,
            file_path: document.file_path,
            document_type: document.document_type,
            source: document.source,
            status: document.status,
            extracted_text: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.write()?.documents.push(row.clone());
        Ok(row)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(
        &self,
        user_id: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .read()?
            .documents
            .iter()
            .filter(|d| d.user_id == user_id)
            .filter(|d| {
                filter
                    .document_type
                    .as_ref()
                    .map_or(true, |t| d.document_type.as_ref() == Some(t))
            })
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn update_document_status(&self, id: &str, update: DocumentStatusUpdate) -> Result<()> {
        let mut tables = self.write()?;
        let document = tables
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow!("document {} not found", id))?;

        document.status = update.status;
        if update.extracted_text.is_some() {
            document.extracted_text = update.extracted_text;
        }
        if update.processed_at.is_some() {
            document.processed_at = update.processed_at;
        }
        Ok(())
    }

    async fn insert_embeddings(&self, rows: Vec<NewEmbedding>) -> Result<usize> {
        let mut tables = self.write()?;
        for row in &rows {
            if !tables.documents.iter().any(|d| d.id == row.document_id) {
                return Err(anyhow!(
                    "embedding references unknown document {}",
                    row.document_id
                ));
            }
        }

        let count = rows.len();
        tables.embeddings.extend(rows.into_iter().map(|row| DocumentEmbedding {
            id: Uuid::new_v4().to_string(),
            document_id: row.document_id,
            content: row.content,
            embedding: row.embedding,
            chunk_index: row.chunk_index,
        }));
        Ok(count)
    }

    async fn match_documents(
        &self,
        query_embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<MatchedChunk>> {
        let tables = self.read()?;
        let owned_by = |document_id: &str, user_id: &str| {
            tables
                .documents
                .iter()
                .any(|d| d.id == document_id && d.user_id == user_id)
        };

        let mut matches: Vec<MatchedChunk> = tables
            .embeddings
            .iter()
            .filter(|e| {
                params
                    .user_id
                    .as_deref()
                    .map_or(true, |user_id| owned_by(&e.document_id, user_id))
            })
            .map(|e| MatchedChunk {
                id: e.id.clone(),
                document_id: e.document_id.clone(),
                content: e.content.clone(),
                similarity: cosine_similarity(query_embedding, &e.embedding),
            })
            .filter(|m| m.similarity > params.match_threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(params.match_count);
        Ok(matches)
    }

    async fn insert_source_embeddings(&self, rows: Vec<NewSourceEmbedding>) -> Result<usize> {
        let count = rows.len();
        self.write()?.source_embeddings.extend(rows);
        Ok(count)
    }

    async fn pending_deadlines(&self) -> Result<Vec<PendingDeadline>> {
        Ok(self
            .read()?
            .deadlines
            .iter()
            .filter(|d| !d.deadline.is_completed && !d.deadline.notification_sent)
            .cloned()
            .collect())
    }

    async fn mark_deadlines_notified(&self, ids: &[String]) -> Result<()> {
        for deadline in self.write()?.deadlines.iter_mut() {
            if ids.contains(&deadline.deadline.id) {
                deadline.deadline.notification_sent = true;
            }
        }
        Ok(())
    }

    async fn insert_notifications(&self, notifications: Vec<NewNotification>) -> Result<()> {
        let now = Utc::now();
        self.write()?
            .notifications
            .extend(notifications.into_iter().map(|n| Notification {
                id: Uuid::new_v4().to_string(),
                user_id: n.user_id,
                title: n.title,
                content: n.content,
                kind: n.kind,
                is_read: n.is_read,
                created_at: now,
            }));
        Ok(())
    }

    async fn crawler_state(&self, source_url: &str) -> Result<Option<CrawlerState>> {
        Ok(self
            .read()?
            .crawler_states
            .iter()
            .find(|s| s.source_url == source_url)
            .cloned())
    }

    async fn insert_crawler_state(&self, state: NewCrawlerState) -> Result<()> {
        self.write()?.crawler_states.push(CrawlerState {
            id: Uuid::new_v4().to_string(),
            source_url: state.source_url,
            content_selector: Some(state.content_selector),
            last_content_hash: state.last_content_hash,
            last_checked_at: state.last_checked_at,
            update_detected_at: None,
            last_change_content_snippet: Some(state.last_change_content_snippet),
        });
        Ok(())
    }

    async fn update_crawler_state(&self, id: &str, update: CrawlerStateUpdate) -> Result<()> {
        let mut tables = self.write()?;
        let state = tables
            .crawler_states
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("crawler state {} not found", id))?;

        state.last_checked_at = update.last_checked_at;
        if let Some(hash) = update.last_content_hash {
            state.last_content_hash = hash;
        }
        if update.update_detected_at.is_some() {
            state.update_detected_at = update.update_detected_at;
        }
        if update.last_change_content_snippet.is_some() {
            state.last_change_content_snippet = update.last_change_content_snippet;
        }
        Ok(())
    }

    async fn insert_legal_update(&self, update: LegalUpdate) -> Result<()> {
        let mut tables = self.write()?;
        if tables.legal_updates_unavailable {
            bail!("legal_updates insert rejected");
        }
        tables.legal_updates.push(update);
        Ok(())
    }

    async fn gaceta_processed(&self, url: &str) -> Result<bool> {
        Ok(self.read()?.gacetas.iter().any(|g| g.url == url))
    }

    async fn record_gaceta(&self, gaceta: ProcessedGaceta) -> Result<()> {
        self.write()?.gacetas.push(gaceta);
        Ok(())
    }

    async fn fallo_processed(&self, url: &str) -> Result<bool> {
        Ok(self.read()?.fallos.iter().any(|f| f.url == url))
    }

    async fn record_fallo(&self, fallo: ProcessedFallo) -> Result<()> {
        self.write()?.fallos.push(fallo);
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for MemoryStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let key = (bucket.to_string(), path.to_string());
        if !upsert && tables.blobs.contains_key(&key) {
            return Err(anyhow!("object {}/{} already exists", bucket, path));
        }
        tables.blobs.insert(key, bytes);
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.blob(bucket, path)?
            .ok_or_else(|| anyhow!("object {}/{} not found", bucket, path))
    }
}

#[async_trait]
impl AuthProvider for MemoryStore {
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>> {
        Ok(self.read()?.tokens.get(token).cloned())
    }
}
