use crate::config::Settings;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const MAX_INPUT_TOKENS: usize = 8191;
const BATCH_SIZE: usize = 64;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[query.replace('\n', " ")]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding provider returned no vector for the query"))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    tokenizer: Arc<CoreBPE>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let tokenizer = tiktoken_rs::cl100k_base()
            .map_err(|e| anyhow!("failed to load cl100k tokenizer: {}", e))?;

        Ok(Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: EMBEDDING_MODEL.to_string(),
            tokenizer: Arc::new(tokenizer),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.openai_api_key, &settings.openai_base_url)
    }

    /// Cuts text down to the model's input limit.
    pub fn truncate_to_limit(&self, text: &str) -> Result<String> {
        let tokens = self.tokenizer.encode_with_special_tokens(text);
        if tokens.len() <= MAX_INPUT_TOKENS {
            return Ok(text.to_string());
        }

        log::warn!(
            "Embedding input has {} tokens, truncating to {}",
            tokens.len(),
            MAX_INPUT_TOKENS
        );
        self.tokenizer
            .decode(tokens[..MAX_INPUT_TOKENS].to_vec())
            .map_err(|e| anyhow!("failed to decode truncated tokens: {}", e))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("OpenAI embeddings error ({}): {}", status, error_text));
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != batch.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                batch.len()
            ));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let inputs = batch
                .iter()
                .map(|text| self.truncate_to_limit(text))
                .collect::<Result<Vec<_>>>()?;
            vectors.extend(self.embed_batch(&inputs).await?);
        }

        log::info!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }
}

/// Cosine similarity over the shared prefix of two vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
