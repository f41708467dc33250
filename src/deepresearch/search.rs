//! Web search provider abstraction and the Tavily implementation.
//!
//! The research loop only requires a single call per sub-query: send a query
//! string, get back ranked snippets with source URLs. [`SearchProvider`] captures
//! exactly that, which keeps the Tavily client swappable for a deterministic mock
//! in tests.
//!
//! Retry, timeout, and placeholder substitution are the
//! [`ResearchLoopController`](crate::ResearchLoopController)'s responsibility —
//! this module just performs one HTTP round-trip per call and exposes the fixed
//! [`placeholder_results`] set used in degraded mode.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::deepresearch::clients::common::get_shared_http_client;
use crate::deepresearch::research::SearchResult;

/// Tavily REST endpoint for the `search` operation.
const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// How many ranked snippets to request per search.
const MAX_RESULTS_PER_SEARCH: usize = 5;

/// Error type for search operations.
#[derive(Debug, Clone)]
pub struct SearchError {
    message: String,
}

impl SearchError {
    pub fn new(message: impl Into<String>) -> Self {
        SearchError {
            message: message.into(),
        }
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search error: {}", self.message)
    }
}

impl Error for SearchError {}

/// Uniform contract for the external web-search service.
///
/// One synchronous call with a result and an error outcome; nothing else. The
/// controller never cares which provider sits behind it.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Issue one search and return ranked snippets, best first.
    async fn search(
        &self,
        query: &str,
    ) -> Result<Vec<SearchResult>, Box<dyn Error + Send + Sync>>;
}

/// [`SearchProvider`] implementation backed by the Tavily search API.
///
/// Reuses the shared pooled HTTP client; each call is a single POST to
/// `/search` with the API key, the query, and `max_results = 5`.
pub struct TavilyClient {
    api_key: String,
    endpoint: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        TavilyClient {
            api_key: api_key.into(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
        }
    }

    /// Override the endpoint (e.g. a local stub server in integration tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Extract search results from a Tavily response body.
    ///
    /// Tavily returns `{"results": [{"url": ..., "content": ...}, ...]}`.
    /// Entries missing a URL are skipped; a missing or non-array `results`
    /// field is an error.
    pub fn parse_response(body: &JsonValue) -> Result<Vec<SearchResult>, SearchError> {
        let entries = body
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| SearchError::new("response has no 'results' array"))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let url = match entry.get("url").and_then(|u| u.as_str()) {
                Some(url) if !url.is_empty() => url,
                _ => continue,
            };
            let snippet = entry
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or_default();
            results.push(SearchResult::new(url, snippet));
        }
        Ok(results)
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        query: &str,
    ) -> Result<Vec<SearchResult>, Box<dyn Error + Send + Sync>> {
        let payload = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": MAX_RESULTS_PER_SEARCH,
        });

        let response = get_shared_http_client()
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SearchError::new(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Box::new(SearchError::new(format!(
                "provider returned HTTP {}",
                status.as_u16()
            ))));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| SearchError::new(format!("invalid JSON body: {}", e)))?;

        let results = Self::parse_response(&body)?;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("TavilyClient::search('{}') -> {} results", query, results.len());
        }
        Ok(results)
    }
}

/// The fixed placeholder result set substituted when a search exhausts its retry.
///
/// Deliberately real-looking data so the downstream rating/reflection/synthesis
/// steps behave normally in degraded mode; every entry is flagged as placeholder
/// so it is reported as such in events and the final answer.
pub fn placeholder_results() -> Vec<SearchResult> {
    vec![
        SearchResult::new(
            "https://www.consumerreports.org",
            "Hybrids save on fuel but EVs save more long-term with $790/year fuel savings \
             and 50% lower maintenance costs.",
        )
        .as_placeholder(),
        SearchResult::new(
            "https://www.edmunds.com",
            "EVs offer instant acceleration, 250+ mile range; gas cars refuel faster, \
             better for long trips.",
        )
        .as_placeholder(),
        SearchResult::new(
            "https://ev-lectron.com",
            "EVs cost $59,205 vs. gas cars at $48,699. Battery production has emissions, \
             but EVs are cleaner with renewable grids.",
        )
        .as_placeholder(),
        SearchResult::new(
            "https://climate.mit.edu",
            "EVs have 40-60% lower lifecycle emissions, equivalent to 88 mpg.",
        )
        .as_placeholder(),
        SearchResult::new(
            "https://www.epa.gov",
            "Over 61,000 EV charging stations in 2025 vs. widespread gas stations.",
        )
        .as_placeholder(),
    ]
}
