use crate::completion_service::{ChatMessage, ChatModel, CompletionRequest, PERPLEXITY_ANSWER_MODEL};
use crate::document_processor::{extract_pdf_text, DocumentProcessor};
use crate::embedding_service::Embedder;
use crate::models::*;
use crate::store::{BlobStorage, LegalStore};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

pub const MATCH_THRESHOLD: f32 = 0.75;
pub const MATCH_COUNT: usize = 5;
pub const ANSWER_TEMPERATURE: f32 = 0.7;

pub const USER_DOCUMENTS_BUCKET: &str = "legal_documents";
pub const ORGANO_JUDICIAL_BUCKET: &str = "organo_judicial_pdf";

pub const NO_CONTEXT_ANSWER: &str =
    "No encontré información suficiente en los documentos disponibles para responder esta pregunta.";

/// Storage bucket holding a user document's file.
pub fn document_bucket(source: Option<&str>) -> &'static str {
    match source {
        Some("Organo Judicial") => ORGANO_JUDICIAL_BUCKET,
        _ => USER_DOCUMENTS_BUCKET,
    }
}

/// Object path for a user upload: the owner's folder plus a millisecond
/// timestamp prefix so repeated uploads of one file do not collide.
pub fn user_storage_path(user_id: &str, file_name: &str) -> String {
    format!("{}/{}_{}", user_id, Utc::now().timestamp_millis(), file_name)
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restricts matches to this user's documents.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub chunks: usize,
    pub embeddings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "count", rename_all = "snake_case")]
pub enum SourceIngest {
    NoText,
    NoEmbeddings,
    Stored(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResult {
    pub answer: String,
    pub sources: Vec<MatchedChunk>,
}

/// Chunk, embed, store, retrieve and answer.
pub struct RagPipeline {
    store: Arc<dyn LegalStore>,
    blobs: Arc<dyn BlobStorage>,
    embedder: Arc<dyn Embedder>,
    answer_model: Option<Arc<dyn ChatModel>>,
    processor: DocumentProcessor,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn LegalStore>,
        blobs: Arc<dyn BlobStorage>,
        embedder: Arc<dyn Embedder>,
        answer_model: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        Self {
            store,
            blobs,
            embedder,
            answer_model,
            processor: DocumentProcessor::new(),
        }
    }

    /// Downloads a user document, extracts its text and indexes it. The
    /// document ends in `processed`, or in `error` when any step fails.
    pub async fn ingest_document(&self, document_id: &str) -> Result<IngestReport> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| anyhow!("document {} not found", document_id))?;

        let result = self.extract_and_index(&document).await;
        if let Err(e) = &result {
            log::error!("Ingestion of document {} failed: {}", document_id, e);
            self.mark_failed(document_id).await;
        }
        result
    }

    /// Indexes text that was already extracted for a stored document.
    pub async fn index_text(&self, document_id: &str, text: &str) -> Result<IngestReport> {
        let result = self.index_document_text(document_id, text).await;
        if result.is_err() {
            self.mark_failed(document_id).await;
        }
        result
    }

    async fn extract_and_index(&self, document: &Document) -> Result<IngestReport> {
        let bucket = document_bucket(document.source.as_deref());
        let bytes = self.blobs.download(bucket, &document.file_path).await?;
        let extraction = extract_pdf_text(bytes).await?;
        if extraction.requires_ocr {
            return Err(anyhow!(
                "{} has no selectable text and needs OCR",
                document.file_name
            ));
        }
        self.index_document_text(&document.id, &extraction.text).await
    }

    async fn index_document_text(&self, document_id: &str, text: &str) -> Result<IngestReport> {
        self.store
            .update_document_status(
                document_id,
                DocumentStatusUpdate {
                    status: DocumentStatus::Processing,
                    extracted_text: Some(text.to_string()),
                    processed_at: None,
                },
            )
            .await?;

        let chunks = self.processor.create_chunks(text);
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&contents).await?;

        let rows: Vec<NewEmbedding> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| NewEmbedding {
                document_id: document_id.to_string(),
                content: chunk.content,
                embedding,
                chunk_index: chunk.index,
            })
            .collect();
        let embeddings = self.store.insert_embeddings(rows).await?;

        self.store
            .update_document_status(
                document_id,
                DocumentStatusUpdate {
                    status: DocumentStatus::Processed,
                    extracted_text: None,
                    processed_at: Some(Utc::now()),
                },
            )
            .await?;

        log::info!(
            "Indexed document {}: {} chunks, {} embeddings",
            document_id,
            contents.len(),
            embeddings
        );
        Ok(IngestReport {
            chunks: contents.len(),
            embeddings,
        })
    }

    async fn mark_failed(&self, document_id: &str) {
        let update = DocumentStatusUpdate::status(DocumentStatus::Error);
        if let Err(e) = self.store.update_document_status(document_id, update).await {
            log::error!("Could not flag document {} as failed: {}", document_id, e);
        }
    }

    /// Embeds an official publication PDF (gaceta or fallo) stored in a bucket.
    pub async fn ingest_source_pdf(
        &self,
        bucket: &str,
        path: &str,
        source_url: &str,
    ) -> Result<SourceIngest> {
        log::info!("Downloading PDF from bucket '{}' at path '{}'", bucket, path);
        let bytes = self.blobs.download(bucket, path).await?;
        let extraction = extract_pdf_text(bytes).await?;
        if extraction.requires_ocr || extraction.text.trim().is_empty() {
            log::warn!("No text could be extracted from {}", source_url);
            return Ok(SourceIngest::NoText);
        }

        let chunks = self.processor.create_chunks(&extraction.text);
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&contents).await?;
        if vectors.is_empty() {
            log::warn!("No embeddings generated for {}", source_url);
            return Ok(SourceIngest::NoEmbeddings);
        }

        let rows: Vec<NewSourceEmbedding> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| NewSourceEmbedding {
                source_url: source_url.to_string(),
                content: chunk.content,
                embedding,
                chunk_index: chunk.index,
            })
            .collect();
        let stored = self.store.insert_source_embeddings(rows).await?;

        log::info!("Stored {} embeddings for {}", stored, source_url);
        Ok(SourceIngest::Stored(stored))
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<MatchedChunk>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let params = MatchParams {
            match_threshold: MATCH_THRESHOLD,
            match_count: MATCH_COUNT,
            user_id: options.user_id.clone(),
        };

        let matches = self.store.match_documents(&query_embedding, &params).await?;
        log::info!("Found {} matching chunks", matches.len());
        Ok(matches)
    }

    /// Answers strictly from the given context passages.
    pub async fn answer(&self, query: &str, context: &[String]) -> Result<String> {
        let model = self
            .answer_model
            .as_ref()
            .ok_or_else(|| anyhow!("PERPLEXITY_API_KEY no está configurada"))?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_answer_prompt(query, context)),
            ChatMessage::user(query),
        ])
        .model(PERPLEXITY_ANSWER_MODEL)
        .temperature(ANSWER_TEMPERATURE);

        let completion = model.complete(request).await?;
        Ok(completion.content)
    }

    pub async fn ask(&self, query: &str, options: &SearchOptions) -> Result<AskResult> {
        let sources = self.search(query, options).await?;
        if sources.is_empty() {
            return Ok(AskResult {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
            });
        }

        let context: Vec<String> = sources.iter().map(|s| s.content.clone()).collect();
        let answer = self.answer(query, &context).await?;
        Ok(AskResult { answer, sources })
    }
}

pub fn build_answer_prompt(query: &str, context: &[String]) -> String {
    let context_text = context
        .iter()
        .map(|content| format!("- {}", content.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Eres un asistente legal experto en la legislación panameña. Responde la pregunta del usuario \
basándote ÚNICAMENTE en el contexto proporcionado. Si la respuesta no se encuentra en el contexto, \
indica que no tienes información suficiente en los documentos proporcionados para responder. \
No inventes información. Sé conciso y directo. Contexto:\n{context_text}\n\nPregunta: {query}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{pdf_with_text, KeywordEmbedder, RecordingModel};

    fn pipeline(store: Arc<MemoryStore>, model: Option<Arc<RecordingModel>>) -> RagPipeline {
        RagPipeline::new(
            store.clone(),
            store,
            Arc::new(KeywordEmbedder),
            model.map(|m| m as Arc<dyn ChatModel>),
        )
    }

    async fn stored_document(store: &MemoryStore, user_id: &str) -> Document {
        store
            .insert_document(NewDocument {
                user_id: user_id.to_string(),
                file_name: "contrato.pdf".to_string(),
                file_path: format!("{user_id}/contrato.pdf"),
                document_type: Some("contrato".to_string()),
                source: None,
                status: DocumentStatus::Uploaded,
            })
            .await
            .unwrap()
    }

    #[test]
    fn answer_prompt_flattens_context_lines() {
        let prompt = build_answer_prompt(
            "¿Cuál es el plazo?",
            &["El plazo\nes de 30 días".to_string(), "Ley 8".to_string()],
        );
        assert!(prompt.contains("ÚNICAMENTE"));
        assert!(prompt.contains("- El plazo es de 30 días\n- Ley 8"));
        assert!(prompt.ends_with("Pregunta: ¿Cuál es el plazo?"));
    }

    #[test]
    fn organo_judicial_documents_live_in_their_own_bucket() {
        assert_eq!(document_bucket(Some("Organo Judicial")), ORGANO_JUDICIAL_BUCKET);
        assert_eq!(document_bucket(None), USER_DOCUMENTS_BUCKET);
    }

    #[test]
    fn uploads_land_in_the_owner_folder() {
        let path = user_storage_path("u1", "contrato.pdf");
        assert!(path.starts_with("u1/"));
        assert!(path.ends_with("_contrato.pdf"));
    }

    #[tokio::test]
    async fn indexing_stores_chunks_in_order_and_marks_processed() {
        let store = Arc::new(MemoryStore::new());
        let document = stored_document(&store, "u1").await;
        let text = format!("{} {}", "plazo ".repeat(200), "contrato ".repeat(200));

        let report = pipeline(store.clone(), None)
            .index_text(&document.id, &text)
            .await
            .unwrap();

        let embeddings = store.embeddings_for(&document.id).unwrap();
        assert_eq!(report.embeddings, embeddings.len());
        assert_eq!(report.chunks, 4);
        let order: Vec<_> = embeddings.iter().map(|e| e.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);

        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Processed);
        assert!(stored.processed_at.is_some());
        assert_eq!(stored.extracted_text.as_deref(), Some(text.as_str()));
    }

    #[tokio::test]
    async fn uploaded_pdf_is_indexed_and_marked_processed() {
        let store = Arc::new(MemoryStore::new());
        let document = stored_document(&store, "u1").await;
        store
            .upload(
                USER_DOCUMENTS_BUCKET,
                &document.file_path,
                pdf_with_text("El contrato fija un plazo de treinta dias"),
                "application/pdf",
                true,
            )
            .await
            .unwrap();

        let report = pipeline(store.clone(), None)
            .ingest_document(&document.id)
            .await
            .unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.embeddings, 1);

        let embeddings = store.embeddings_for(&document.id).unwrap();
        assert!(embeddings[0].content.contains("plazo de treinta dias"));
        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn source_pdf_chunks_are_stored_under_its_url() {
        let store = Arc::new(MemoryStore::new());
        store
            .upload(
                "gacetas-pdf",
                "public/GACETA_1.pdf",
                pdf_with_text("Ley 8 sobre multas y plazos"),
                "application/pdf",
                true,
            )
            .await
            .unwrap();

        let outcome = pipeline(store.clone(), None)
            .ingest_source_pdf("gacetas-pdf", "public/GACETA_1.pdf", "https://gaceta.example/1.pdf")
            .await
            .unwrap();
        assert_eq!(outcome, SourceIngest::Stored(1));

        let rows = store.source_embeddings().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_url, "https://gaceta.example/1.pdf");
        assert!(rows[0].content.contains("multas"));
    }

    #[tokio::test]
    async fn unreadable_upload_flags_document_as_error() {
        let store = Arc::new(MemoryStore::new());
        let document = stored_document(&store, "u1").await;
        store
            .upload(
                USER_DOCUMENTS_BUCKET,
                &document.file_path,
                b"esto no es un pdf".to_vec(),
                "application/pdf",
                true,
            )
            .await
            .unwrap();

        let result = pipeline(store.clone(), None).ingest_document(&document.id).await;
        assert!(result.is_err());

        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_user() {
        let store = Arc::new(MemoryStore::new());
        let mine = stored_document(&store, "u1").await;
        let theirs = stored_document(&store, "u2").await;
        let rag = pipeline(store.clone(), None);
        rag.index_text(&mine.id, "El plazo para apelar").await.unwrap();
        rag.index_text(&theirs.id, "Otro plazo ajeno").await.unwrap();

        let options = SearchOptions {
            user_id: Some("u1".to_string()),
        };
        let matches = rag.search("plazo", &options).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, mine.id);
    }

    #[tokio::test]
    async fn ask_sends_grounded_prompt_to_answer_model() {
        let store = Arc::new(MemoryStore::new());
        let document = stored_document(&store, "u1").await;
        let model = Arc::new(RecordingModel::replying("Son 30 días."));
        let rag = pipeline(store.clone(), Some(model.clone()));
        rag.index_text(&document.id, "El contrato vence en 30 días")
            .await
            .unwrap();

        let result = rag.ask("contrato", &SearchOptions::default()).await.unwrap();
        assert_eq!(result.answer, "Son 30 días.");
        assert_eq!(result.sources.len(), 1);

        let requests = model.requests();
        assert_eq!(requests[0].model.as_deref(), Some(PERPLEXITY_ANSWER_MODEL));
        assert_eq!(requests[0].temperature, Some(ANSWER_TEMPERATURE));
        assert!(requests[0].messages[0].content.contains("- El contrato vence en 30 días"));
    }

    #[tokio::test]
    async fn ask_without_matches_skips_the_model() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(RecordingModel::replying("no debería llamarse"));
        let rag = pipeline(store, Some(model.clone()));

        let result = rag.ask("multa", &SearchOptions::default()).await.unwrap();
        assert_eq!(result.answer, NO_CONTEXT_ANSWER);
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn answer_requires_a_configured_model() {
        let rag = pipeline(Arc::new(MemoryStore::new()), None);
        let err = rag.answer("plazo", &["texto".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("PERPLEXITY_API_KEY"));
    }
}
