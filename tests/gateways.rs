//! Gateway, tool and notebook service behavior against in-memory backends.
//!
//! The fakes replay scripted responses and record every request, so these
//! tests cover the request shaping and fallback logic without network
//! access.

use async_trait::async_trait;
use chrono::NaiveDate;
use notebook_rag::domain::{Answer, Citation, Notebook, NotebookId, NotebookRepository, Query};
use notebook_rag::error::{Error, Result};
use notebook_rag::generate::{ContentGenerator, TextGenerator};
use notebook_rag::models::{SearchResult, NO_CONTENT};
use notebook_rag::notebook_service::{AddSourcesRequest, AskRequest, CreateNotebookRequest, NotebookService};
use notebook_rag::search::{SearchBackend, SearchGateway, SearchMode, SearchRequest};
use notebook_rag::tools::{run_tool, ToolContext, ToolRegistry};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ─── Fakes ──────────────────────────────────────────────────────────

/// Replays scripted search outcomes in order.
#[derive(Default)]
struct ScriptedSearch {
    outcomes: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl ScriptedSearch {
    fn new(outcomes: Vec<Result<Value>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Replays scripted model outputs in order and records prompts.
#[derive(Default)]
struct ScriptedModel {
    outputs: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(outputs: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.into_iter().map(|s| Ok(s.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

fn filter_rejected() -> Error {
    Error::Backend {
        service: "search",
        status: 400,
        code: "INVALID_ARGUMENT".to_string(),
        message: "Invalid filter syntax: date >= \"2026/01/26\"".to_string(),
    }
}

fn documents_response(titles: &[&str]) -> Value {
    let results: Vec<Value> = titles
        .iter()
        .map(|t| {
            json!({
                "id": t,
                "document": {
                    "id": t,
                    "derivedStructData": {
                        "title": t,
                        "link": format!("gs://docs/{}.pdf", t),
                        "extractive_segments": [{ "content": format!("{} の本文", t) }]
                    }
                }
            })
        })
        .collect();
    json!({ "results": results })
}

fn tool_context(search: Arc<ScriptedSearch>, model: Arc<ScriptedModel>) -> ToolContext {
    let search: Arc<dyn SearchBackend> = search;
    let model: Arc<dyn TextGenerator> = model;
    ToolContext::new(
        Arc::new(SearchGateway::new(search, "ja")),
        Arc::new(ContentGenerator::new(model)),
        20,
    )
}

const RANGE_PARAMS: &str = "```json\n{\"query\": \"議事録\", \"filter\": \"date >= \\\"2026-01-26\\\" AND date <= \\\"2026-01-30\\\"\", \"order_by\": null}\n```";

// ─── Search parameter extraction ────────────────────────────────────

#[tokio::test]
async fn test_search_params_for_date_range() {
    let model = ScriptedModel::new(vec![RANGE_PARAMS]);
    let generator = ContentGenerator::new(model.clone());
    let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

    let params = generator
        .generate_search_params_on("2026/1/26〜1/30の議事録", today)
        .await
        .unwrap();

    assert_eq!(params.query, "議事録");
    let filter = params.filter.unwrap();
    assert!(filter.contains("date >="));
    assert!(filter.contains("date <="));
    assert!(params.order_by.is_none());

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("2026-02-01"));
    assert!(prompts[0].contains("2026/1/26〜1/30の議事録"));
}

#[tokio::test]
async fn test_search_params_malformed_output_defaults() {
    let model = ScriptedModel::new(vec!["申し訳ありませんが、理解できませんでした。"]);
    let generator = ContentGenerator::new(model);

    let params = generator.generate_search_params("最新の報告書").await.unwrap();
    assert_eq!(params.query, "最新の報告書");
    assert_eq!(params.filter, None);
    assert_eq!(params.order_by, None);
}

#[tokio::test]
async fn test_search_params_backend_error_propagates() {
    let model = Arc::new(ScriptedModel {
        outputs: Mutex::new(VecDeque::from(vec![Err(Error::config("no credentials"))])),
        prompts: Mutex::new(Vec::new()),
    });
    let generator = ContentGenerator::new(model);
    assert!(generator.generate_search_params("q").await.is_err());
}

// ─── Search gateway ─────────────────────────────────────────────────

#[tokio::test]
async fn test_filter_rejection_retries_once_without_filter() {
    let search = ScriptedSearch::new(vec![Err(filter_rejected()), Ok(documents_response(&["second"]))]);
    let gateway = SearchGateway::new(search.clone(), "ja");

    let docs = gateway
        .search_documents("議事録", 20, Some("date >= \"2026/01/26\""), Some("date desc"))
        .await
        .unwrap();

    assert_eq!(docs.results.len(), 1);
    assert_eq!(docs.results[0].title, "second");

    let requests = search.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].filter.is_some());
    assert!(requests[0].order_by.is_some());
    assert_eq!(requests[1].filter, None);
    assert_eq!(requests[1].order_by, None);
    assert_eq!(requests[1].query, "議事録");
    assert_eq!(requests[1].page_size, 20);
}

#[tokio::test]
async fn test_filter_fallback_is_not_a_loop() {
    let search = ScriptedSearch::new(vec![Err(filter_rejected()), Err(filter_rejected()), Ok(json!({}))]);
    let gateway = SearchGateway::new(search.clone(), "ja");

    let err = gateway
        .search_documents("q", 20, Some("bad"), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(search.requests().len(), 2);
}

#[tokio::test]
async fn test_other_errors_propagate_without_retry() {
    let search = ScriptedSearch::new(vec![Err(Error::Backend {
        service: "search",
        status: 403,
        code: "PERMISSION_DENIED".to_string(),
        message: "caller lacks permission".to_string(),
    })]);
    let gateway = SearchGateway::new(search.clone(), "ja");

    let err = gateway
        .search_documents("q", 20, Some("date desc"), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("PERMISSION_DENIED"));
    assert_eq!(search.requests().len(), 1);
}

#[tokio::test]
async fn test_filter_error_without_filter_is_not_retried() {
    let search = ScriptedSearch::new(vec![Err(filter_rejected())]);
    let gateway = SearchGateway::new(search.clone(), "ja");

    assert!(gateway.search_documents("q", 20, None, None).await.is_err());
    assert_eq!(search.requests().len(), 1);
}

#[tokio::test]
async fn test_documents_without_text_get_marker() {
    let search = ScriptedSearch::new(vec![Ok(json!({
        "results": [{
            "id": "1",
            "document": {
                "derivedStructData": {
                    "title": "スキャン資料",
                    "link": "gs://docs/scan.pdf",
                    "snippets": [{ "snippet_status": "NONE" }]
                }
            }
        }]
    }))]);
    let gateway = SearchGateway::new(search, "ja");

    let docs = gateway.search_documents("q", 20, None, None).await.unwrap();
    assert_eq!(docs.results[0].content, NO_CONTENT);
    assert!(!docs.results[0].content.is_empty());
}

#[tokio::test]
async fn test_absent_summary_yields_empty_result() {
    let search = ScriptedSearch::new(vec![Ok(json!({ "totalSize": 0 }))]);
    let gateway = SearchGateway::new(search.clone(), "ja");

    let result = gateway.search_and_answer("q").await.unwrap();
    assert_eq!(result, SearchResult::default());
    assert_eq!(result.summary, "");

    let requests = search.requests();
    assert_eq!(requests[0].mode, SearchMode::Answer);
    assert_eq!(requests[0].page_size, 5);
    assert_eq!(requests[0].language_code, "ja");
}

// ─── Tools ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_documents_tool_pipeline() {
    let search = ScriptedSearch::new(vec![Ok(documents_response(&["定例会議", "週次報告"]))]);
    let model = ScriptedModel::new(vec![RANGE_PARAMS, "1/28の定例で方針が決まりました [Document 1]"]);
    let ctx = tool_context(search.clone(), model.clone());
    let registry = ToolRegistry::with_builtins();
    let tool = registry.find("search_documents").unwrap();

    let reply = run_tool(tool, json!({ "query": "2026/1/26〜1/30の議事録" }), &ctx).await;
    assert!(!reply.is_error, "{}", reply.text);
    assert!(reply.text.starts_with("## 回答"));
    assert!(reply.text.contains("方針が決まりました"));
    assert!(reply.text.contains("### 検索条件"));
    assert!(reply.text.contains("1. **定例会議**"));
    assert!(reply.text.contains("   - URL: gs://docs/週次報告.pdf"));

    let requests = search.requests();
    assert_eq!(requests[0].query, "議事録");
    assert_eq!(requests[0].mode, SearchMode::Documents);

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("[Document 1] 定例会議"));
    assert!(prompts[1].contains("2026/1/26〜1/30の議事録"));
}

#[tokio::test]
async fn test_tool_requires_query() {
    let ctx = tool_context(ScriptedSearch::new(vec![]), ScriptedModel::new(vec![]));
    let registry = ToolRegistry::with_builtins();

    for name in ["search_documents", "generate_slide_draft", "generate_diagram"] {
        let reply = run_tool(registry.find(name).unwrap(), json!({}), &ctx).await;
        assert!(reply.is_error);
        assert!(reply.text.starts_with("エラー:"), "{}", reply.text);
    }
}

#[tokio::test]
async fn test_tool_backend_failure_is_labeled() {
    let search = ScriptedSearch::new(vec![Err(Error::Backend {
        service: "search",
        status: 503,
        code: "UNAVAILABLE".to_string(),
        message: "try again".to_string(),
    })]);
    let ctx = tool_context(search, ScriptedModel::new(vec!["{}"]));
    let registry = ToolRegistry::with_builtins();

    let reply = run_tool(registry.find("generate_slide_draft").unwrap(), json!({ "query": "q" }), &ctx).await;
    assert!(reply.is_error);
    assert!(reply.text.starts_with("スライド生成エラー: "));
    assert!(reply.text.contains("try again"));
}

#[tokio::test]
async fn test_tool_with_no_documents() {
    let search = ScriptedSearch::new(vec![Ok(json!({ "results": [] }))]);
    let ctx = tool_context(search, ScriptedModel::new(vec!["{}"]));
    let registry = ToolRegistry::with_builtins();

    let reply = run_tool(registry.find("generate_diagram").unwrap(), json!({ "query": "q" }), &ctx).await;
    assert!(!reply.is_error);
    assert!(reply.text.starts_with("検索結果が見つかりませんでした。"));
}

#[tokio::test]
async fn test_diagram_tool_uses_chart_type() {
    let search = ScriptedSearch::new(vec![Ok(documents_response(&["申請フロー"]))]);
    let model = ScriptedModel::new(vec!["{}", "```mermaid\nsequenceDiagram\n```"]);
    let ctx = tool_context(search, model.clone());
    let registry = ToolRegistry::with_builtins();

    let reply = run_tool(
        registry.find("generate_diagram").unwrap(),
        json!({ "query": "申請の流れ", "chart_type": "sequence" }),
        &ctx,
    )
    .await;
    assert_eq!(reply.text, "```mermaid\nsequenceDiagram\n```");

    let prompts = model.prompts();
    assert!(prompts[1].contains("シーケンス図（sequenceDiagram）"));
    assert!(prompts[1].contains("申請フロー の本文"));
}

#[tokio::test]
async fn test_slide_tool_source_text() {
    let search = ScriptedSearch::new(vec![Ok(documents_response(&["提案書"]))]);
    let model = ScriptedModel::new(vec!["{}", "---\nmarp: true\n---"]);
    let ctx = tool_context(search, model.clone());
    let registry = ToolRegistry::with_builtins();

    let reply = run_tool(registry.find("generate_slide_draft").unwrap(), json!({ "query": "提案" }), &ctx).await;
    assert_eq!(reply.text, "---\nmarp: true\n---");
    assert!(model.prompts()[1].contains("【検索結果】\n\n[Document 1] 提案書\n内容: 提案書 の本文\nURL: gs://docs/提案書.pdf"));
}

// ─── Notebook service ───────────────────────────────────────────────

#[derive(Default)]
struct InMemoryNotebooks {
    notebooks: Mutex<HashMap<String, Notebook>>,
}

#[async_trait]
impl NotebookRepository for InMemoryNotebooks {
    async fn create(&self, id: &NotebookId, display_name: &str) -> Result<Notebook> {
        let notebook = Notebook::new(id.clone(), display_name)?;
        self.notebooks
            .lock()
            .unwrap()
            .insert(id.to_string(), notebook.clone());
        Ok(notebook)
    }

    async fn add_sources(&self, id: &NotebookId, uris: &[String]) -> Result<()> {
        let mut notebooks = self.notebooks.lock().unwrap();
        let notebook = notebooks
            .get_mut(id.as_str())
            .ok_or_else(|| Error::NotFound(format!("notebook {}", id)))?;
        for uri in uris {
            notebook.add_source(uri.clone());
        }
        Ok(())
    }

    async fn ask(&self, id: &NotebookId, query: &Query) -> Result<Answer> {
        let notebooks = self.notebooks.lock().unwrap();
        let notebook = notebooks
            .get(id.as_str())
            .ok_or_else(|| Error::NotFound(format!("notebook {}", id)))?;
        let citations = notebook
            .sources()
            .iter()
            .map(|s| Citation::new(s.clone(), query.text()))
            .collect();
        Ok(Answer::with_citations(format!("{} sources", notebook.sources().len()), citations))
    }
}

#[tokio::test]
async fn test_notebook_service_end_to_end() {
    let service = NotebookService::new(InMemoryNotebooks::default());

    service
        .create_notebook(CreateNotebookRequest {
            notebook_id: "nb-1".into(),
            display_name: "社内資料".into(),
        })
        .await
        .unwrap();

    for _ in 0..2 {
        service
            .add_sources(AddSourcesRequest {
                notebook_id: "nb-1".into(),
                source_uris: vec!["gs://docs/a.pdf".into(), "gs://docs/a.pdf".into()],
            })
            .await
            .unwrap();
    }

    let resp = service
        .ask(AskRequest {
            notebook_id: "nb-1".into(),
            query: "要点は？".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.answer_text, "1 sources");
    assert_eq!(resp.citations.len(), 1);
    assert_eq!(resp.citations[0].source_title, "gs://docs/a.pdf");
    assert_eq!(resp.citations[0].content, "要点は？");
}

#[tokio::test]
async fn test_notebook_service_unknown_notebook() {
    let service = NotebookService::new(InMemoryNotebooks::default());
    let err = service
        .ask(AskRequest {
            notebook_id: "missing".into(),
            query: "q".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_value_objects() {
    let q = Query::new("議事録の要約").unwrap();
    assert_eq!(q.text(), "議事録の要約");
    assert_eq!(q.to_string(), "議事録の要約");
    assert!(Query::new("").is_err());

    let a = Answer::new("x");
    assert!(a.citations().is_empty());
}
