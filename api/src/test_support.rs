use crate::routes::create_router;
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use lexi_rag::completion_service::CompletionRequest;
use lexi_rag::config::{DEFAULT_BIND_ADDR, DEFAULT_OPENAI_BASE_URL, DEFAULT_PERPLEXITY_BASE_URL};
use lexi_rag::crawler::{CrawlError, Fetcher};
use lexi_rag::models::AuthUser;
use lexi_rag::transcription::AudioUpload;
use lexi_rag::{
    ChatModel, Completion, CompletionError, Embedder, MemoryStore, RagPipeline, Settings,
    Transcriber,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const OWNER_TOKEN: &str = "owner-session";

pub fn sample_settings() -> Settings {
    Settings {
        openai_api_key: "sk-test-openai".to_string(),
        openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        perplexity_api_key: Some("pplx-test".to_string()),
        perplexity_base_url: DEFAULT_PERPLEXITY_BASE_URL.to_string(),
        supabase_url: "https://db.example.co".to_string(),
        supabase_anon_key: "anon".to_string(),
        supabase_service_role_key: "service".to_string(),
        job_token: None,
        bind_addr: DEFAULT_BIND_ADDR.to_string(),
        scheduler_interval: None,
        app_env: Some("test".to_string()),
    }
}

type Outcome = Arc<dyn Fn() -> Result<String, CompletionError> + Send + Sync>;
type RequestLog = Arc<Mutex<Vec<CompletionRequest>>>;

/// Chat model answering every request with the same scripted outcome.
pub struct ScriptedModel {
    outcome: Outcome,
    requests: RequestLog,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        let content = (self.outcome)()?;
        Ok(Completion {
            content,
            sources: Vec::new(),
            model: request.model.unwrap_or_default(),
        })
    }
}

fn replying(reply: &str) -> Outcome {
    let reply = reply.to_string();
    Arc::new(move || Ok(reply.clone()))
}

/// Constant vectors, so every stored chunk matches every query.
pub struct FlatEmbedder;

#[async_trait]
impl Embedder for FlatEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

pub struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, audio: AudioUpload) -> Result<String> {
        Ok(format!("transcripción de {}", audio.file_name))
    }
}

#[derive(Default)]
pub struct PageFetcher {
    pages: HashMap<String, String>,
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.pages.get(url).cloned().ok_or_else(|| {
            CrawlError::Status {
                url: url.to_string(),
                status: 404,
            }
            .into()
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.fetch_text(url).await?.into_bytes())
    }
}

/// Builder for an [`AppState`] backed by a [`MemoryStore`] and fake model
/// backends. `OWNER_TOKEN` authenticates as user `owner`.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    settings: Settings,
    chat: Outcome,
    search: Option<Outcome>,
    search_requests: RequestLog,
    pages: HashMap<String, String>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .add_user(
                OWNER_TOKEN,
                AuthUser {
                    id: "owner".to_string(),
                    email: Some("owner@example.com".to_string()),
                },
            )
            .unwrap();

        Self {
            store,
            settings: sample_settings(),
            chat: replying("respuesta"),
            search: Some(replying("respuesta de búsqueda")),
            search_requests: RequestLog::default(),
            pages: HashMap::new(),
        }
    }

    pub fn chat_reply(mut self, reply: &str) -> Self {
        self.chat = replying(reply);
        self
    }

    pub fn chat_error(mut self, error: fn() -> CompletionError) -> Self {
        self.chat = Arc::new(move || Err(error()));
        self
    }

    pub fn search_reply(mut self, reply: &str) -> Self {
        self.search = Some(replying(reply));
        self
    }

    pub fn search_error(mut self, error: fn() -> CompletionError) -> Self {
        self.search = Some(Arc::new(move || Err(error())));
        self
    }

    pub fn without_search_model(mut self) -> Self {
        self.search = None;
        self
    }

    /// Requests the Perplexity model has received so far.
    pub fn search_requests(&self) -> Vec<CompletionRequest> {
        self.search_requests.lock().unwrap().clone()
    }

    pub fn job_token(mut self, token: &str) -> Self {
        self.settings.job_token = Some(token.to_string());
        self
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn state(&self) -> AppState {
        let search_model = self.search.clone().map(|outcome| {
            Arc::new(ScriptedModel {
                outcome,
                requests: self.search_requests.clone(),
            }) as Arc<dyn ChatModel>
        });
        let pipeline = Arc::new(RagPipeline::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(FlatEmbedder),
            search_model.clone(),
        ));

        AppState {
            settings: Arc::new(self.settings.clone()),
            store: self.store.clone(),
            blobs: self.store.clone(),
            auth: self.store.clone(),
            chat_model: Arc::new(ScriptedModel {
                outcome: self.chat.clone(),
                requests: RequestLog::default(),
            }),
            search_model,
            transcriber: Arc::new(EchoTranscriber),
            fetcher: Arc::new(PageFetcher {
                pages: self.pages.clone(),
            }),
            pipeline,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state())
    }
}
