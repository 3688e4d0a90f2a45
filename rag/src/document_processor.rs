use crate::models::DocumentChunk;
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static MULTI_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[\r\n]").unwrap());
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x{9F}]").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no se pudieron leer los datos del archivo PDF")]
    Empty,
    #[error("invalid PDF structure: {0}")]
    InvalidPdf(String),
    #[error("PDF extraction failed: {0}")]
    Failed(String),
}

/// Text pulled out of a PDF, already preprocessed.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub raw_length: usize,
    /// No selectable text was found; the PDF is probably a scan.
    pub requires_ocr: bool,
}

/// A PDF read from the local filesystem by [`DocumentProcessor::process_directory`].
#[derive(Debug, Clone)]
pub struct LocalPdf {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub text: String,
    pub chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentProcessor {
    config: ChunkConfig,
}

impl DocumentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Splits text into overlapping fixed-size character windows, dropping
    /// windows that contain only whitespace.
    pub fn create_chunks(&self, content: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = content.chars().collect();
        let size = self.config.chunk_size.max(1);
        let step = size.saturating_sub(self.config.overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + size).min(chars.len());
            let window: String = chars[start..end].iter().collect();

            if !window.trim().is_empty() {
                chunks.push(DocumentChunk {
                    index: chunks.len(),
                    content: window,
                    start_position: start,
                    end_position: end,
                });
            }

            if end == chars.len() {
                break;
            }
            start += step;
        }

        log::info!("Created {} chunks", chunks.len());
        chunks
    }

    /// Extracts every `*.pdf` in `dir`. Extraction is CPU bound and runs on the
    /// rayon pool.
    pub fn process_directory(&self, dir: &Path) -> Result<Vec<LocalPdf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_pdf = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let documents = paths
            .par_iter()
            .map(|path| self.process_local_pdf(path))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Processed {} documents", documents.len());
        Ok(documents)
    }

    fn process_local_pdf(&self, path: &Path) -> Result<LocalPdf> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;

        log::info!("Processing PDF: {}", file_name);

        let bytes = fs::read(path)?;
        let raw = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow!("failed to extract {}: {}", file_name, e))?;
        let text = preprocess_text(&raw);
        let chunks = self.create_chunks(&text);

        Ok(LocalPdf {
            file_name,
            path: path.to_path_buf(),
            bytes,
            text,
            chunks,
        })
    }
}

/// Normalizes text extracted from a PDF so it is safe to embed in JSON and
/// prompts.
pub fn preprocess_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let trimmed_lines = text
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = MULTI_WHITESPACE.replace_all(&trimmed_lines, " ");
    let without_blank_lines = BLANK_LINE.replace_all(&collapsed, "");
    let cleaned = CONTROL_CHARS
        .replace_all(&without_blank_lines, "")
        .replace(['\u{2028}', '\u{2029}'], " ");

    log::debug!("Preprocessed text: {} characters", cleaned.chars().count());
    cleaned
}

/// Extracts and preprocesses the text of an in-memory PDF.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> Result<Extraction, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }

    // pdf-extract panics on some malformed files; the join error catches it.
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ExtractionError::Failed(format!("PDF parser aborted: {e}")))?
        .map_err(|e| match e {
            pdf_extract::OutputError::PdfError(inner) => {
                ExtractionError::InvalidPdf(inner.to_string())
            }
            other => ExtractionError::Failed(other.to_string()),
        })?;

    let raw_length = raw.chars().count();
    if raw.trim().is_empty() {
        return Ok(Extraction {
            text: String::new(),
            raw_length,
            requires_ocr: true,
        });
    }

    Ok(Extraction {
        text: preprocess_text(&raw),
        raw_length,
        requires_ocr: false,
    })
}
