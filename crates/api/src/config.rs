use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub model: ModelConfig,
    pub search: SearchConfig,
    pub concurrency: ConcurrencyConfig,
}

/// Output format of the log subscriber. Read before [`AppConfig`], so config warnings are
/// already logged in the chosen format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "" | "text" | "pretty" => Ok(Self::Text),
            other => anyhow::bail!("LOG_FORMAT must be text or json, got {other}"),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("LOG_FORMAT")
            .map(|raw| Self::parse(&raw))
            .unwrap_or(Ok(Self::Text))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub enabled: bool,
    pub engine_id: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_analyses: usize,
    pub request_timeout_secs: u64,
}

impl ConcurrencyConfig {
    /// Budget for one whole analysis. Search and model calls run back to back, each bounded
    /// by the request timeout.
    pub fn analysis_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.saturating_mul(2))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            model: ModelConfig {
                api_key: String::new(),
                model: extract::llm::DEFAULT_MODEL.to_string(),
                base_url: extract::llm::DEFAULT_BASE_URL.to_string(),
            },
            search: SearchConfig {
                enabled: false,
                engine_id: None,
                api_key: None,
                base_url: extract::search::DEFAULT_BASE_URL.to_string(),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_analyses: 4,
                request_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from a variable lookup; unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.model.api_key = var("GOOGLE_API_KEY").context("GOOGLE_API_KEY is required")?;
        if let Some(model) = var("GEMINI_MODEL") {
            config.model.model = model;
        }
        if let Some(base_url) = var("GEMINI_BASE_URL") {
            config.model.base_url = base_url;
        }

        config.search.enabled = var("USE_CUSTOM_SEARCH")
            .map(|v| parse_bool(&v))
            .transpose()?
            .unwrap_or(false);
        config.search.engine_id = var("CUSTOM_SEARCH_ENGINE_ID");
        config.search.api_key = var("CUSTOM_SEARCH_API_KEY");
        if let Some(base_url) = var("CUSTOM_SEARCH_BASE_URL") {
            config.search.base_url = base_url;
        }
        if config.search.enabled
            && (config.search.engine_id.is_none() || config.search.api_key.is_none())
        {
            tracing::warn!("custom search enabled without credentials, using model grounding only");
            config.search.enabled = false;
        }

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(n) = var("MAX_CONCURRENT_ANALYSES") {
            config.concurrency.max_concurrent_analyses = n
                .parse()
                .with_context(|| format!("MAX_CONCURRENT_ANALYSES is not a number: {n}"))?;
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS") {
            config.concurrency.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("REQUEST_TIMEOUT_SECS is not a number: {secs}"))?;
        }
        if config.concurrency.max_concurrent_analyses == 0 {
            anyhow::bail!("MAX_CONCURRENT_ANALYSES must be at least 1");
        }
        if config.concurrency.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be at least 1");
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other}"),
    }
}
