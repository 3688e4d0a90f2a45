use anyhow::Result;
use lexi_rag::crawler::{ChangeMonitor, FalloScraper, Fetcher, GacetaScraper, HttpFetcher};
use lexi_rag::{
    AuthProvider, BlobStorage, ChatModel, DeadlineMonitor, LegalStore, OpenAiCompatibleChat,
    OpenAiEmbedder, RagPipeline, Settings, SupabaseClient, Transcriber, WhisperTranscriber,
};
use std::sync::Arc;

/// Shared, immutable service handles for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn LegalStore>,
    pub blobs: Arc<dyn BlobStorage>,
    pub auth: Arc<dyn AuthProvider>,
    /// OpenAI chat model.
    pub chat_model: Arc<dyn ChatModel>,
    /// Perplexity model; absent when no Perplexity key is configured.
    pub search_model: Option<Arc<dyn ChatModel>>,
    pub transcriber: Arc<dyn Transcriber>,
    pub fetcher: Arc<dyn Fetcher>,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let supabase = Arc::new(SupabaseClient::from_settings(&settings));
        let embedder = Arc::new(OpenAiEmbedder::from_settings(&settings)?);
        let search_model = OpenAiCompatibleChat::perplexity(&settings)
            .map(|model| Arc::new(model) as Arc<dyn ChatModel>);
        if search_model.is_none() {
            log::warn!("PERPLEXITY_API_KEY not set; search and answer routes will fail");
        }

        let pipeline = Arc::new(RagPipeline::new(
            supabase.clone(),
            supabase.clone(),
            embedder,
            search_model.clone(),
        ));

        Ok(Self {
            chat_model: Arc::new(OpenAiCompatibleChat::openai(&settings)),
            transcriber: Arc::new(WhisperTranscriber::from_settings(&settings)),
            fetcher: Arc::new(HttpFetcher::new()?),
            store: supabase.clone(),
            blobs: supabase.clone(),
            auth: supabase,
            search_model,
            pipeline,
            settings: Arc::new(settings),
        })
    }

    pub fn deadline_monitor(&self) -> DeadlineMonitor {
        DeadlineMonitor::new(self.store.clone())
    }

    pub fn gaceta_scraper(&self) -> GacetaScraper {
        GacetaScraper::new(
            self.fetcher.clone(),
            self.store.clone(),
            self.blobs.clone(),
            self.pipeline.clone(),
        )
    }

    pub fn fallo_scraper(&self) -> FalloScraper {
        FalloScraper::new(
            self.fetcher.clone(),
            self.store.clone(),
            self.blobs.clone(),
            self.pipeline.clone(),
        )
    }

    pub fn change_monitor(&self) -> ChangeMonitor {
        ChangeMonitor::new(self.fetcher.clone(), self.store.clone())
    }
}
