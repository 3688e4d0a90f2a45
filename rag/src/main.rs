// Bulk loader: extracts every PDF in a directory, stores it for a user and
// indexes it for retrieval.

use anyhow::{anyhow, Result};
use lexi_rag::models::{DocumentStatus, NewDocument};
use lexi_rag::query_service::{user_storage_path, USER_DOCUMENTS_BUCKET};
use lexi_rag::{
    BlobStorage, DocumentProcessor, LegalStore, OpenAiEmbedder, RagPipeline, Settings,
    SupabaseClient,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(dir), Some(user_id)) = (args.next(), args.next()) else {
        return Err(anyhow!("usage: lexi-ingest <pdf-directory> <user-id>"));
    };
    let dir = PathBuf::from(dir);

    let settings = Settings::from_env()?;
    let supabase = Arc::new(SupabaseClient::from_settings(&settings));
    let embedder = Arc::new(OpenAiEmbedder::from_settings(&settings)?);
    let pipeline = RagPipeline::new(supabase.clone(), supabase.clone(), embedder, None);

    log::info!("Processing PDFs in {}", dir.display());
    let pdfs = DocumentProcessor::new().process_directory(&dir)?;
    log::info!("Found {} PDF files", pdfs.len());

    let mut indexed = 0;
    for pdf in pdfs {
        if pdf.text.trim().is_empty() {
            log::warn!("Skipping {}: no selectable text", pdf.file_name);
            continue;
        }

        let path = user_storage_path(&user_id, &pdf.file_name);
        supabase
            .upload(USER_DOCUMENTS_BUCKET, &path, pdf.bytes, "application/pdf", false)
            .await?;
        let document = supabase
            .insert_document(NewDocument {
                user_id: user_id.clone(),
                file_name: pdf.file_name.clone(),
                file_path: path,
                document_type: Some("user_upload".to_string()),
                source: Some("user_upload".to_string()),
                status: DocumentStatus::Uploaded,
            })
            .await?;

        match pipeline.index_text(&document.id, &pdf.text).await {
            Ok(report) => {
                log::info!(
                    "Indexed {} ({} chunks, {} embeddings)",
                    pdf.file_name,
                    report.chunks,
                    report.embeddings
                );
                indexed += 1;
            }
            Err(e) => log::error!("Failed to index {}: {:#}", pdf.file_name, e),
        }
    }

    log::info!("Done: {} documents indexed", indexed);
    Ok(())
}
