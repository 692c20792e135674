//! Web search, summarised for a 128x56 panel.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SearchConfig;

const MAX_RESULTS: u32 = 3;
const ANSWER_CHARS: usize = 150;
const TITLE_CHARS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search service returned {status}")]
    Status { status: reqwest::StatusCode },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSource {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub answer: String,
    #[serde(default, alias = "results")]
    pub sources: Vec<SearchSource>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
    include_answer: bool,
    include_images: bool,
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Self {
        let api_key = Some(config.api_key.trim().to_string()).filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("no search API key configured; search returns sample results");
        }
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        info!("web search: {query:?}");
        let Some(key) = &self.api_key else {
            return Ok(sample_results(query));
        };

        let response = self
            .http
            .post(format!("{}/search", self.api_url))
            .bearer_auth(key)
            .json(&SearchRequest {
                query,
                max_results: MAX_RESULTS,
                include_answer: true,
                include_images: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status { status });
        }

        let results: SearchResults = response.json().await?;
        info!("{} results for {query:?}", results.sources.len());
        Ok(results)
    }
}

/// Placeholder results used without an API key.
pub fn sample_results(query: &str) -> SearchResults {
    SearchResults {
        answer: format!(
            "This is a simulated answer about \"{query}\". To enable real search, \
             set PERPLEXITY_API_KEY."
        ),
        sources: vec![
            SearchSource {
                title: "Sample Source 1".into(),
                url: "https://example.com/1".into(),
                snippet: "This is a sample search result.".into(),
            },
            SearchSource {
                title: "Sample Source 2".into(),
                url: "https://example.com/2".into(),
                snippet: "Another sample result for demonstration purposes.".into(),
            },
        ],
    }
}

/// Render results as display lines: a shortened answer, then numbered
/// source titles.
pub fn format_for_display(outcome: &Result<SearchResults, SearchError>) -> String {
    let results = match outcome {
        Ok(results) => results,
        Err(e) => return format!("Search error: {e}"),
    };

    let mut text = String::new();
    if !results.answer.is_empty() {
        let summary: String = results.answer.chars().take(ANSWER_CHARS).collect();
        text.push_str(&summary);
        text.push_str("...\n\n");
    }
    if !results.sources.is_empty() {
        text.push_str("Sources:\n");
        for (index, source) in results.sources.iter().enumerate() {
            let title: String = source.title.chars().take(TITLE_CHARS).collect();
            text.push_str(&format!("{}. {title}\n", index + 1));
        }
    }
    text
}
