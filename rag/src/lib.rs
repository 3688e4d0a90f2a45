pub mod completion_service;
pub mod config;
pub mod crawler;
pub mod deadlines;
pub mod document_processor;
pub mod embedding_service;
pub mod entities;
pub mod models;
pub mod prompts;
pub mod query_service;
pub mod store;
pub mod transcription;

pub use completion_service::{ChatModel, Completion, CompletionError, OpenAiCompatibleChat};
pub use config::Settings;
pub use deadlines::DeadlineMonitor;
pub use document_processor::DocumentProcessor;
pub use embedding_service::{Embedder, OpenAiEmbedder};
pub use models::*;
pub use query_service::RagPipeline;
pub use store::{AuthProvider, BlobStorage, LegalStore, MemoryStore, SupabaseClient};
pub use transcription::{Transcriber, WhisperTranscriber};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::completion_service::{ChatModel, Completion, CompletionError, CompletionRequest};
    use crate::crawler::{CrawlError, Fetcher};
    use crate::embedding_service::Embedder;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves `app` on an ephemeral local port and returns its base URL.
    pub async fn spawn_upstream(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    const VOCABULARY: [&str; 4] = ["plazo", "contrato", "ley", "multa"];

    /// Bag-of-keywords vectors; texts sharing a keyword are similar.
    pub struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCABULARY
                        .iter()
                        .map(|word| lower.matches(word).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    pub struct RecordingModel {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingModel {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<Completion, CompletionError> {
            let model = request.model.clone().unwrap_or_default();
            self.requests.lock().unwrap().push(request);
            Ok(Completion {
                content: self.reply.clone(),
                sources: Vec::new(),
                model,
            })
        }
    }

    /// Single-page PDF showing `text` in Helvetica. `text` must be ASCII
    /// without parentheses or backslashes.
    pub fn pdf_with_text(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_offset = pdf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));
        pdf.extend_from_slice(xref.as_bytes());
        pdf
    }

    /// Serves canned pages and files; unknown URLs answer 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, html: &str) -> Self {
            self.file(url, html.as_bytes().to_vec())
        }

        pub fn file(mut self, url: &str, bytes: Vec<u8>) -> Self {
            self.responses.insert(url.to_string(), bytes);
            self
        }

        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.responses.get(url).cloned().ok_or_else(|| {
                CrawlError::Status {
                    url: url.to_string(),
                    status: 404,
                }
                .into()
            })
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            Ok(String::from_utf8(self.get(url)?)?)
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
            self.get(url)
        }
    }
}
