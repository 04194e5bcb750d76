//! Notebook domain: identifiers, queries, answers and the repository seam.
//!
//! Value objects validate at construction, so anything holding a
//! [`NotebookId`] or [`Query`] can skip re-checking it before a backend
//! call.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Identifier of a notebook. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NotebookId(String);

impl NotebookId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::validation("notebook id must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotebookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user question. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        Ok(Self(text))
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One piece of evidence backing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub source_title: String,
    pub content: String,
}

impl Citation {
    pub fn new(source_title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_title: source_title.into(),
            content: content.into(),
        }
    }
}

/// Answer text plus citations in the order the backend listed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    answer_text: String,
    citations: Vec<Citation>,
}

impl Answer {
    /// An answer with no citations.
    pub fn new(answer_text: impl Into<String>) -> Self {
        Self {
            answer_text: answer_text.into(),
            citations: Vec::new(),
        }
    }

    pub fn with_citations(answer_text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            answer_text: answer_text.into(),
            citations,
        }
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.answer_text)
    }
}

/// A named container of source documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notebook {
    notebook_id: NotebookId,
    display_name: String,
    sources: Vec<String>,
}

impl Notebook {
    pub fn new(notebook_id: NotebookId, display_name: impl Into<String>) -> Result<Self> {
        Self::with_sources(notebook_id, display_name, Vec::new())
    }

    /// Build a notebook with initial sources. Duplicates are collapsed.
    pub fn with_sources(
        notebook_id: NotebookId,
        display_name: impl Into<String>,
        sources: Vec<String>,
    ) -> Result<Self> {
        let display_name = display_name.into();
        if display_name.is_empty() {
            return Err(Error::validation("notebook display name must not be empty"));
        }
        let mut notebook = Self {
            notebook_id,
            display_name,
            sources: Vec::with_capacity(sources.len()),
        };
        for uri in sources {
            notebook.add_source(uri);
        }
        Ok(notebook)
    }

    pub fn notebook_id(&self) -> &NotebookId {
        &self.notebook_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Add a source URI. Adding a URI that is already present does nothing.
    pub fn add_source(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        if !self.sources.contains(&uri) {
            self.sources.push(uri);
        }
    }
}

/// Storage and question answering for notebooks.
///
/// Implementations talk to a notebook backend; tests use in-memory fakes.
#[async_trait]
pub trait NotebookRepository: Send + Sync {
    async fn create(&self, notebook_id: &NotebookId, display_name: &str) -> Result<Notebook>;

    /// Import sources and wait for the import to finish.
    async fn add_sources(&self, notebook_id: &NotebookId, source_uris: &[String]) -> Result<()>;

    async fn ask(&self, notebook_id: &NotebookId, query: &Query) -> Result<Answer>;
}
