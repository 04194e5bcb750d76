//! Search gateway over a Discovery Engine serving config.
//!
//! Two request shapes are issued against the same `:search` endpoint:
//!
//! - **answer**: a handful of top results summarized by the backend, with
//!   citations ([`SearchGateway::search_and_answer`]);
//! - **documents**: a larger page of raw results carrying snippets and
//!   extractive segments, left for the caller to summarize
//!   ([`SearchGateway::search_documents`]).
//!
//! Document searches may carry a filter and an ordering produced by the
//! generation backend. When the search backend rejects either as
//! malformed, the same query is retried once without them.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::GoogleClient;
use crate::models::{DocumentSearchResult, SearchResult};
use crate::response::{parse_document_results, parse_search_result};

const SERVICE: &str = "search";

/// Results fed into the backend summary.
pub const SUMMARY_RESULT_COUNT: u32 = 5;

/// Default page size for document searches.
pub const DEFAULT_DOCUMENT_PAGE_SIZE: u32 = 20;

/// Backend messages that identify a rejected filter or ordering expression.
pub const FILTER_ERROR_MARKERS: [&str; 4] = [
    "Unsupported field",
    "Invalid filter syntax",
    "Unsupported rhs value",
    "Parsing filter failed",
];

/// API host for a Discovery Engine location.
pub fn discovery_host(location: &str) -> String {
    if location == "global" {
        "discoveryengine.googleapis.com".to_string()
    } else {
        format!("{}-discoveryengine.googleapis.com", location)
    }
}

/// Fully-qualified default serving config of a search engine.
pub fn serving_config(project_id: &str, location: &str, engine_id: &str) -> String {
    format!(
        "projects/{}/locations/{}/collections/default_collection/engines/{}/servingConfigs/default_serving_config",
        project_id, location, engine_id
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Backend summary with citations.
    Answer,
    /// Raw results with snippets and extractive content.
    Documents,
}

/// One `:search` call, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub page_size: u32,
    pub language_code: String,
    pub filter: Option<String>,
    pub order_by: Option<String>,
}

impl SearchRequest {
    /// The JSON body for `servingConfigs.search`.
    pub fn to_body(&self) -> Value {
        let content_search_spec = match self.mode {
            SearchMode::Answer => json!({
                "summarySpec": {
                    "summaryResultCount": SUMMARY_RESULT_COUNT,
                    "includeCitations": true,
                    "ignoreNonSummarySeekingQuery": true,
                    "ignoreAdversarialQuery": true,
                    "languageCode": self.language_code,
                },
                "snippetSpec": { "returnSnippet": true },
            }),
            SearchMode::Documents => json!({
                "snippetSpec": { "returnSnippet": true, "maxSnippetCount": 3 },
                "extractiveContentSpec": {
                    "maxExtractiveAnswerCount": 2,
                    "maxExtractiveSegmentCount": 3,
                    "numPreviousSegments": 1,
                    "numNextSegments": 1,
                    "returnExtractiveSegmentScore": true,
                },
            }),
        };

        let mut body = json!({
            "query": self.query,
            "pageSize": self.page_size,
            "contentSearchSpec": content_search_spec,
            "queryExpansionSpec": { "condition": "AUTO" },
            "spellCorrectionSpec": { "mode": "AUTO" },
        });
        if let Some(filter) = &self.filter {
            body["filter"] = json!(filter);
        }
        if let Some(order_by) = &self.order_by {
            body["orderBy"] = json!(order_by);
        }
        body
    }

    fn has_constraints(&self) -> bool {
        self.filter.is_some() || self.order_by.is_some()
    }

    fn without_constraints(&self) -> Self {
        Self {
            filter: None,
            order_by: None,
            ..self.clone()
        }
    }
}

/// Transport seam for search calls.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search and return the raw response body.
    async fn search(&self, request: &SearchRequest) -> Result<Value>;
}

#[async_trait]
impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        (**self).search(request).await
    }
}

/// [`SearchBackend`] that posts to the Discovery Engine REST API.
pub struct DiscoverySearchBackend {
    client: GoogleClient,
    url: String,
}

impl DiscoverySearchBackend {
    pub fn new(client: GoogleClient, project_id: &str, location: &str, engine_id: &str) -> Self {
        let url = format!(
            "https://{}/v1alpha/{}:search",
            discovery_host(location),
            serving_config(project_id, location, engine_id)
        );
        Self { client, url }
    }

    pub fn from_config(client: GoogleClient, config: &Config) -> Result<Self> {
        Ok(Self::new(
            client,
            config.project_id()?,
            &config.gcp.location,
            config.engine_id()?,
        ))
    }
}

#[async_trait]
impl SearchBackend for DiscoverySearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        self.client
            .post_json(SERVICE, &self.url, &request.to_body())
            .await
    }
}

/// How a failed search should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchErrorClass {
    /// The filter or ordering was rejected; retry without them.
    RetryableFilter,
    Fatal,
}

pub fn classify_search_error(err: &Error) -> SearchErrorClass {
    match err {
        Error::Backend { message, .. }
            if err.is_invalid_argument()
                && FILTER_ERROR_MARKERS.iter().any(|m| message.contains(m)) =>
        {
            SearchErrorClass::RetryableFilter
        }
        _ => SearchErrorClass::Fatal,
    }
}

pub struct SearchGateway<B> {
    backend: B,
    language_code: String,
}

/// Gateway over a shared, type-erased backend.
pub type SharedSearchGateway = SearchGateway<Arc<dyn SearchBackend>>;

impl<B: SearchBackend> SearchGateway<B> {
    pub fn new(backend: B, language_code: impl Into<String>) -> Self {
        Self {
            backend,
            language_code: language_code.into(),
        }
    }

    /// Search and let the backend summarize the top results.
    pub async fn search_and_answer(&self, query: &str) -> Result<SearchResult> {
        let request = SearchRequest {
            query: query.to_string(),
            mode: SearchMode::Answer,
            page_size: SUMMARY_RESULT_COUNT,
            language_code: self.language_code.clone(),
            filter: None,
            order_by: None,
        };
        let response = self.backend.search(&request).await?;
        Ok(parse_search_result(&response))
    }

    /// Search for raw documents, optionally filtered and ordered.
    ///
    /// A rejected filter or ordering triggers exactly one retry with both
    /// removed; any other failure is returned as-is.
    pub async fn search_documents(
        &self,
        query: &str,
        page_size: u32,
        filter: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<DocumentSearchResult> {
        let request = SearchRequest {
            query: query.to_string(),
            mode: SearchMode::Documents,
            page_size,
            language_code: self.language_code.clone(),
            filter: filter.map(str::to_string),
            order_by: order_by.map(str::to_string),
        };

        let response = match self.backend.search(&request).await {
            Ok(response) => response,
            Err(err)
                if request.has_constraints()
                    && classify_search_error(&err) == SearchErrorClass::RetryableFilter =>
            {
                tracing::warn!(
                    filter = ?request.filter,
                    order_by = ?request.order_by,
                    error = %err,
                    "filter rejected by search backend, retrying without filter"
                );
                self.backend.search(&request.without_constraints()).await?
            }
            Err(err) => return Err(err),
        };

        Ok(parse_document_results(&response))
    }
}
