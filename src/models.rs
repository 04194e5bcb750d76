//! Result types produced by the search and generation gateways.
//!
//! These are plain values owned by the call that produced them.

use serde::Serialize;

/// Title used for a result whose metadata carries a URL but no title.
pub const UNTITLED: &str = "無題";

/// Content used for a document from which no text could be extracted.
pub const NO_CONTENT: &str = "(本文なし)";

/// A title/URL pair referenced by a search summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchCitation {
    pub title: String,
    pub url: String,
}

/// Summary text plus citations from a search-and-answer call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// AI-generated summary. Empty when the backend produced none.
    pub summary: String,
    pub citations: Vec<SearchCitation>,
}

/// One retrieved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

impl DocumentResult {
    /// Build a result, substituting [`NO_CONTENT`] for empty content.
    pub fn new(title: impl Into<String>, content: impl Into<String>, url: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            title: title.into(),
            content: if content.is_empty() {
                NO_CONTENT.to_string()
            } else {
                content
            },
            url: url.into(),
        }
    }
}

/// Documents in backend order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSearchResult {
    pub results: Vec<DocumentResult>,
}

impl DocumentSearchResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Search parameters extracted from a natural-language request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchParams {
    pub query: String,
    pub filter: Option<String>,
    pub order_by: Option<String>,
}

impl SearchParams {
    /// Use the request as-is: no filter, backend ordering.
    pub fn passthrough(query: &str) -> Self {
        Self {
            query: query.to_string(),
            filter: None,
            order_by: None,
        }
    }
}
