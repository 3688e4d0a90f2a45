use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Runtime settings read from the process environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub perplexity_api_key: Option<String>,
    pub perplexity_base_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub job_token: Option<String>,
    pub bind_addr: String,
    pub scheduler_interval: Option<Duration>,
    pub app_env: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let scheduler_interval = match optional("LEXI_SCHEDULER_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    anyhow!("LEXI_SCHEDULER_INTERVAL_SECS must be a number of seconds, got {raw:?}")
                })?;
                Some(Duration::from_secs(secs.max(60)))
            }
            None => None,
        };

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: optional("OPENAI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            perplexity_api_key: optional("PERPLEXITY_API_KEY"),
            perplexity_base_url: optional("PERPLEXITY_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PERPLEXITY_BASE_URL.to_string()),
            supabase_url: required("SUPABASE_URL")?,
            supabase_anon_key: required("SUPABASE_ANON_KEY")?,
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
            job_token: optional("LEXI_JOB_TOKEN"),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            scheduler_interval,
            app_env: optional("APP_ENV"),
        })
    }

    /// Presence report for the configuration check endpoint. Values are never
    /// echoed back, except a three character prefix of the Perplexity key.
    pub fn presence_report(&self) -> Vec<(&'static str, String)> {
        let perplexity = match &self.perplexity_api_key {
            Some(key) => format!(
                "Configurada (comienza con {}...)",
                key.chars().take(3).collect::<String>()
            ),
            None => "No configurada".to_string(),
        };
        let base_url = if self.perplexity_base_url == DEFAULT_PERPLEXITY_BASE_URL {
            "Usando valor por defecto".to_string()
        } else {
            self.perplexity_base_url.clone()
        };

        vec![
            ("PERPLEXITY_API_KEY", perplexity),
            ("PERPLEXITY_API_BASE_URL", base_url),
            ("OPENAI_API_KEY", configured(!self.openai_api_key.is_empty())),
            ("SUPABASE_URL", configured(!self.supabase_url.is_empty())),
            ("SUPABASE_ANON_KEY", configured(!self.supabase_anon_key.is_empty())),
            ("LEXI_JOB_TOKEN", configured(self.job_token.is_some())),
            (
                "APP_ENV",
                self.app_env.clone().unwrap_or_else(|| "No establecido".to_string()),
            ),
        ]
    }
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| anyhow!("{name} environment variable not set"))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn configured(present: bool) -> String {
    if present { "Configurada" } else { "No configurada" }.to_string()
}
