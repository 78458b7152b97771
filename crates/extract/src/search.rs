use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::schema::{Channel, SearchResult};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
/// The Custom Search API returns at most ten results per call.
pub const MAX_RESULTS: usize = 10;

/// Google Custom Search JSON API client.
#[derive(Clone)]
pub struct CustomSearchClient {
    base_url: String,
    api_key: String,
    engine_id: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    search_information: Option<SearchInformation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    #[serde(default)]
    total_results: Option<String>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

impl CustomSearchClient {
    pub fn new(api_key: String, engine_id: String) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key, engine_id)
    }

    pub fn with_base_url(base_url: String, api_key: String, engine_id: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            engine_id,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(self)
    }

    /// Run a query. Failures degrade to an empty list: a broken search channel must not
    /// fail the analysis.
    pub async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult> {
        match self.try_search(query, num_results).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "custom search failed, continuing without external sources");
                Vec::new()
            }
        }
    }

    pub async fn try_search(&self, query: &str, num_results: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/customsearch/v1", self.base_url);
        let num = num_results.clamp(1, MAX_RESULTS).to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to Custom Search")?;

        if !response.status().is_success() {
            anyhow::bail!("Custom Search request failed: {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Custom Search response")?;

        tracing::info!(
            total_results = body
                .search_information
                .as_ref()
                .and_then(|info| info.total_results.as_deref())
                .unwrap_or("0"),
            returned = body.items.len(),
            "custom search complete"
        );

        Ok(body
            .items
            .into_iter()
            .filter(|item| !item.link.trim().is_empty())
            .map(|item| {
                let result = SearchResult::new(item.link, item.title, Channel::ExternalSearch);
                match item.snippet {
                    Some(snippet) => result.with_snippet(snippet),
                    None => result,
                }
            })
            .collect())
    }
}
