//! [`NotebookRepository`] backed by the Discovery Engine notebook API.
//!
//! - create: `POST v1alpha/projects/{p}/locations/{l}/notebooks?notebookId=`
//! - add sources: `POST .../notebooks/{id}/sources:import`, then poll the
//!   returned long-running operation until it reports `done`
//! - ask: `POST .../engines/{id}/servingConfigs/default_serving_config:answer`

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;
use crate::domain::{Answer, Citation, Notebook, NotebookId, NotebookRepository, Query};
use crate::error::{Error, Result};
use crate::http::GoogleClient;
use crate::models::UNTITLED;
use crate::search::discovery_host;

const SERVICE: &str = "notebook";
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Notebook API URLs. Ids are percent-encoded as single path segments or
/// query values, so `/`, `&` or `#` in an id cannot reshape the request.
#[derive(Debug, Clone)]
pub struct NotebookEndpoints {
    base_url: String,
    project_id: String,
    location: String,
}

impl NotebookEndpoints {
    pub fn new(project_id: &str, location: &str) -> Self {
        Self {
            base_url: format!("https://{}/v1alpha", discovery_host(location)),
            project_id: project_id.to_string(),
            location: location.to_string(),
        }
    }

    /// `.../locations/{l}/notebooks?notebookId={id}`
    pub fn create(&self, notebook_id: &NotebookId) -> Result<Url> {
        let mut url = self.under_location(&["notebooks"])?;
        url.query_pairs_mut()
            .append_pair("notebookId", notebook_id.as_str());
        Ok(url)
    }

    /// `.../notebooks/{id}/sources:import`
    pub fn import_sources(&self, notebook_id: &NotebookId) -> Result<Url> {
        self.under_location(&["notebooks", notebook_id.as_str(), "sources:import"])
    }

    /// `.../engines/{id}/servingConfigs/default_serving_config:answer`
    pub fn answer(&self, notebook_id: &NotebookId) -> Result<Url> {
        self.under_location(&[
            "collections",
            "default_collection",
            "engines",
            notebook_id.as_str(),
            "servingConfigs",
            "default_serving_config:answer",
        ])
    }

    fn under_location(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || Error::config(format!("invalid notebook endpoint: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .extend(["projects", self.project_id.as_str(), "locations", self.location.as_str()])
            .extend(segments);
        Ok(url)
    }
}

pub struct DiscoveryNotebookRepository {
    client: GoogleClient,
    endpoints: NotebookEndpoints,
}

impl DiscoveryNotebookRepository {
    pub fn new(client: GoogleClient, project_id: &str, location: &str) -> Self {
        Self {
            client,
            endpoints: NotebookEndpoints::new(project_id, location),
        }
    }

    pub fn from_config(client: GoogleClient, config: &Config) -> Result<Self> {
        Ok(Self::new(client, config.project_id()?, &config.gcp.location))
    }

    async fn wait_for_operation(&self, mut operation: Value) -> Result<()> {
        loop {
            if operation.get("done").and_then(Value::as_bool) == Some(true) {
                if let Some(err) = operation.get("error") {
                    return Err(Error::Backend {
                        service: SERVICE,
                        status: 0,
                        code: err
                            .get("code")
                            .map(|c| c.to_string())
                            .unwrap_or_default(),
                        message: err
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("source import failed")
                            .to_string(),
                    });
                }
                return Ok(());
            }

            let Some(name) = operation.get("name").and_then(Value::as_str) else {
                // Synchronous response with no operation handle.
                return Ok(());
            };
            let url = format!("{}/{}", self.endpoints.base_url, name);

            tracing::debug!(operation = name, "waiting for source import");
            tokio::time::sleep(POLL_INTERVAL).await;
            operation = self.client.get_json(SERVICE, &url, &[]).await?;
        }
    }
}

#[async_trait]
impl NotebookRepository for DiscoveryNotebookRepository {
    async fn create(&self, notebook_id: &NotebookId, display_name: &str) -> Result<Notebook> {
        let url = self.endpoints.create(notebook_id)?;
        self.client
            .post_json(SERVICE, url.as_str(), &json!({ "displayName": display_name }))
            .await?;
        Notebook::new(notebook_id.clone(), display_name)
    }

    async fn add_sources(&self, notebook_id: &NotebookId, source_uris: &[String]) -> Result<()> {
        let url = self.endpoints.import_sources(notebook_id)?;
        let body = json!({ "gcsSource": { "uris": source_uris } });
        let operation = self.client.post_json(SERVICE, url.as_str(), &body).await?;
        self.wait_for_operation(operation).await
    }

    async fn ask(&self, notebook_id: &NotebookId, query: &Query) -> Result<Answer> {
        let url = self.endpoints.answer(notebook_id)?;
        let body = json!({
            "query": { "text": query.text() },
            "answerGenerationSpec": { "includeCitations": true },
        });
        let resp = self.client.post_json(SERVICE, url.as_str(), &body).await?;
        Ok(parse_answer(&resp))
    }
}

/// Convert an `:answer` response into an [`Answer`].
///
/// Each citation source points at an entry of `answer.references` by
/// `referenceId` (the entry's index). Sources that do not resolve are
/// dropped.
pub fn parse_answer(response: &Value) -> Answer {
    let answer = response.get("answer").unwrap_or(&Value::Null);
    let text = answer
        .get("answerText")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let references: &[Value] = answer
        .get("references")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut citations = Vec::new();
    let sources = answer
        .get("citations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| c.get("sources").and_then(Value::as_array))
        .flatten();

    for source in sources {
        let Some(index) = source
            .get("referenceId")
            .and_then(Value::as_str)
            .and_then(|id| id.parse::<usize>().ok())
        else {
            continue;
        };
        if let Some(citation) = references.get(index).and_then(reference_citation) {
            citations.push(citation);
        }
    }

    Answer::with_citations(text, citations)
}

fn reference_citation(reference: &Value) -> Option<Citation> {
    if let Some(doc) = reference.get("unstructuredDocumentInfo") {
        let content = doc
            .get("chunkContents")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| c.get("content").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        return Some(Citation::new(title_or_uri(doc), content));
    }

    if let Some(chunk) = reference.get("chunkInfo") {
        let meta = chunk.get("documentMetadata").unwrap_or(&Value::Null);
        let content = chunk
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Some(Citation::new(title_or_uri(meta), content));
    }

    None
}

fn title_or_uri(v: &Value) -> String {
    ["title", "uri"]
        .iter()
        .filter_map(|k| v.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(UNTITLED)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let endpoints = NotebookEndpoints::new("p", "global");
        let id = NotebookId::new("nb-1").unwrap();

        assert_eq!(
            endpoints.create(&id).unwrap().as_str(),
            "https://discoveryengine.googleapis.com/v1alpha/projects/p/locations/global/notebooks?notebookId=nb-1"
        );
        assert_eq!(
            endpoints.import_sources(&id).unwrap().as_str(),
            "https://discoveryengine.googleapis.com/v1alpha/projects/p/locations/global/notebooks/nb-1/sources:import"
        );
        assert_eq!(
            endpoints.answer(&id).unwrap().as_str(),
            "https://discoveryengine.googleapis.com/v1alpha/projects/p/locations/global/collections/default_collection/engines/nb-1/servingConfigs/default_serving_config:answer"
        );
    }

    #[test]
    fn test_ids_are_escaped() {
        let endpoints = NotebookEndpoints::new("p", "eu");
        let id = NotebookId::new("a/b&c#d").unwrap();

        let create = endpoints.create(&id).unwrap();
        assert_eq!(create.path(), "/v1alpha/projects/p/locations/eu/notebooks");
        assert_eq!(create.query(), Some("notebookId=a%2Fb%26c%23d"));
        assert_eq!(create.fragment(), None);
        let pairs: Vec<(String, String)> = create.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("notebookId".to_string(), "a/b&c#d".to_string())]);

        let import = endpoints.import_sources(&id).unwrap();
        assert_eq!(
            import.path(),
            "/v1alpha/projects/p/locations/eu/notebooks/a%2Fb&c%23d/sources:import"
        );
        assert_eq!(import.fragment(), None);
        assert!(endpoints
            .answer(&id)
            .unwrap()
            .path()
            .contains("/engines/a%2Fb&c%23d/servingConfigs/"));
    }

    #[test]
    fn test_citations_resolve_references() {
        let resp = json!({
            "answer": {
                "answerText": "要約です",
                "citations": [
                    { "startIndex": "0", "endIndex": "4", "sources": [{ "referenceId": "1" }] },
                    { "sources": [{ "referenceId": "0" }, { "referenceId": "9" }] },
                ],
                "references": [
                    { "unstructuredDocumentInfo": {
                        "uri": "gs://b/a.pdf",
                        "title": "資料A",
                        "chunkContents": [{ "content": "one" }, { "content": "two" }]
                    }},
                    { "chunkInfo": {
                        "content": "chunk text",
                        "documentMetadata": { "uri": "gs://b/b.pdf" }
                    }},
                ]
            }
        });
        let answer = parse_answer(&resp);
        assert_eq!(answer.answer_text(), "要約です");
        assert_eq!(
            answer.citations(),
            &[
                Citation::new("gs://b/b.pdf", "chunk text"),
                Citation::new("資料A", "one\ntwo"),
            ]
        );
    }

    #[test]
    fn test_missing_answer_is_empty() {
        let answer = parse_answer(&json!({}));
        assert_eq!(answer.answer_text(), "");
        assert!(answer.citations().is_empty());
    }

    #[test]
    fn test_reference_without_title_or_uri() {
        let r = json!({ "chunkInfo": { "content": "c" } });
        assert_eq!(reference_citation(&r), Some(Citation::new(UNTITLED, "c")));
        assert_eq!(reference_citation(&json!({ "other": {} })), None);
    }
}
