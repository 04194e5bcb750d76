//! Notebook use cases over a [`NotebookRepository`].
//!
//! Requests arrive as plain DTOs (CLI arguments, deserialized JSON); the
//! service turns them into validated domain values before touching the
//! repository, so malformed input never reaches the backend.

use serde::{Deserialize, Serialize};

use crate::domain::{NotebookId, NotebookRepository, Query};
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotebookRequest {
    pub notebook_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateNotebookResponse {
    pub notebook_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddSourcesRequest {
    pub notebook_id: String,
    pub source_uris: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub notebook_id: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationDto {
    pub source_title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskResponse {
    pub answer_text: String,
    pub citations: Vec<CitationDto>,
}

pub struct NotebookService<R> {
    repository: R,
}

impl<R: NotebookRepository> NotebookService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn create_notebook(
        &self,
        request: CreateNotebookRequest,
    ) -> Result<CreateNotebookResponse> {
        let notebook_id = NotebookId::new(request.notebook_id)?;
        let notebook = self
            .repository
            .create(&notebook_id, &request.display_name)
            .await?;

        Ok(CreateNotebookResponse {
            notebook_id: notebook.notebook_id().to_string(),
            display_name: notebook.display_name().to_string(),
        })
    }

    pub async fn add_sources(&self, request: AddSourcesRequest) -> Result<()> {
        let notebook_id = NotebookId::new(request.notebook_id)?;
        self.repository
            .add_sources(&notebook_id, &request.source_uris)
            .await
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let notebook_id = NotebookId::new(request.notebook_id)?;
        let query = Query::new(request.query)?;
        let answer = self.repository.ask(&notebook_id, &query).await?;

        Ok(AskResponse {
            answer_text: answer.answer_text().to_string(),
            citations: answer
                .citations()
                .iter()
                .map(|c| CitationDto {
                    source_title: c.source_title.clone(),
                    content: c.content.clone(),
                })
                .collect(),
        })
    }
}
