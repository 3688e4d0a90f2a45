mod analysis;
mod assistant;
mod documents;
mod jobs;
mod rag;
mod system;

pub use analysis::{extract_entities, transcribe};
pub use assistant::{analyze_document, chat, perplexity_search, process_document};
pub use documents::{extract_pdf_text, list_documents, process_stored_document, upload_document};
pub use jobs::{
    cron_scheduler, gaceta_crawler, generate_embeddings, legal_crawler, monitor_legal_deadlines,
    scrape_gaceta_oficial, scrape_organo_judicial,
};
pub use rag::{ask, generate_answer, search_documents};
pub use system::{env_check, health};

use axum::extract::Multipart;
use std::collections::HashMap;

/// A file part read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Multipart body split into file parts (by field name) and text fields.
#[derive(Debug, Default)]
pub struct MultipartBody {
    pub files: HashMap<String, UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl MultipartBody {
    pub async fn read(
        mut multipart: Multipart,
    ) -> Result<Self, axum::extract::multipart::MultipartError> {
        let mut body = MultipartBody::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await?.to_vec();
                    body.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes,
                        },
                    );
                }
                None => {
                    let value = field.text().await?;
                    body.fields.insert(name, value);
                }
            }
        }
        Ok(body)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}
