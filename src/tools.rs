//! Tools exposed to MCP clients.
//!
//! Every tool follows the same pipeline:
//!
//! ```text
//! query ──▶ generate_search_params ──▶ search_documents ──▶ generation ──▶ text
//!             (query, filter, order)      (top N docs)
//! ```
//!
//! Tools return plain text. Failures never escape a tool call: the bridge
//! turns them into an error-flagged text result via [`run_tool`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generate::{
    ContentGenerator, SharedContentGenerator, TextGenerator, CHART_TYPES, DEFAULT_CHART_TYPE,
};
use crate::models::{DocumentSearchResult, SearchParams};
use crate::search::{SearchBackend, SearchGateway, SharedSearchGateway};

/// Entries listed under the reference section of a search answer.
pub const MAX_LISTED_REFERENCES: usize = 10;

const NO_RESULTS: &str = "検索結果が見つかりませんでした。";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    /// Prefix for error results, e.g. `"検索エラー"`.
    fn error_label(&self) -> &str;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String>;
}

/// Text result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReply {
    pub text: String,
    pub is_error: bool,
}

/// Run a tool, converting any failure into an error reply.
///
/// Validation failures read `エラー: <message>`; everything else is
/// prefixed with the tool's [`Tool::error_label`].
pub async fn run_tool(tool: &dyn Tool, params: Value, ctx: &ToolContext) -> ToolReply {
    match tool.execute(params, ctx).await {
        Ok(text) => ToolReply {
            text,
            is_error: false,
        },
        Err(Error::Validation(msg)) => ToolReply {
            text: format!("エラー: {}", msg),
            is_error: true,
        },
        Err(err) => {
            tracing::warn!(tool = tool.name(), error = %err, "tool call failed");
            ToolReply {
                text: format!("{}: {}", tool.error_label(), err),
                is_error: true,
            }
        }
    }
}

/// Gateways shared by every tool call.
pub struct ToolContext {
    search: Arc<SharedSearchGateway>,
    generator: Arc<SharedContentGenerator>,
    page_size: u32,
}

impl ToolContext {
    pub fn new(
        search: Arc<SharedSearchGateway>,
        generator: Arc<SharedContentGenerator>,
        page_size: u32,
    ) -> Self {
        Self {
            search,
            generator,
            page_size,
        }
    }

    pub fn from_backends(
        search: Arc<dyn SearchBackend>,
        generator: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(SearchGateway::new(search, config.search.language_code.clone())),
            Arc::new(ContentGenerator::new(generator)),
            config.search.page_size,
        )
    }

    pub fn generator(&self) -> &SharedContentGenerator {
        &self.generator
    }

    /// Extract search parameters from `query` and run a document search.
    pub async fn find_documents(&self, query: &str) -> Result<(SearchParams, DocumentSearchResult)> {
        let params = self.generator.generate_search_params(query).await?;
        tracing::debug!(
            query = %params.query,
            filter = ?params.filter,
            order_by = ?params.order_by,
            "extracted search params"
        );
        let docs = self
            .search
            .search_documents(
                &params.query,
                self.page_size,
                params.filter.as_deref(),
                params.order_by.as_deref(),
            )
            .await?;
        Ok((params, docs))
    }
}

fn require_query(params: &Value) -> Result<&str> {
    params
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| Error::validation("queryパラメータが必要です。"))
}

fn query_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": description }
        },
        "required": ["query"]
    })
}

/// Answer a question from retrieved documents.
pub struct SearchDocumentsTool;

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "社内ドキュメント（PDF/Googleドライブ）を検索し、要約と引用元を返す。"
    }

    fn parameters_schema(&self) -> Value {
        query_schema("検索キーワードや質問内容")
    }

    fn error_label(&self) -> &str {
        "検索エラー"
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query = require_query(&params)?;
        let (search_params, docs) = ctx.find_documents(query).await?;
        if docs.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let answer = ctx
            .generator()
            .generate_answer_from_context(query, &docs.results)
            .await?;
        Ok(format_search_answer(&answer, &search_params, &docs))
    }
}

/// Draft a slide deck from retrieved documents.
pub struct SlideDraftTool;

#[async_trait]
impl Tool for SlideDraftTool {
    fn name(&self) -> &str {
        "generate_slide_draft"
    }

    fn description(&self) -> &str {
        "指定されたトピックや検索結果に基づき、スライド構成案（Markdown）を生成する。"
    }

    fn parameters_schema(&self) -> Value {
        query_schema("スライドのテーマ")
    }

    fn error_label(&self) -> &str {
        "スライド生成エラー"
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query = require_query(&params)?;
        let (_, docs) = ctx.find_documents(query).await?;
        if docs.is_empty() {
            return Ok(format!("{}スライド生成をスキップします。", NO_RESULTS));
        }

        ctx.generator()
            .generate_slide_markdown(&slide_source_text(&docs))
            .await
    }
}

/// Draw a Mermaid diagram from retrieved documents.
pub struct DiagramTool;

#[async_trait]
impl Tool for DiagramTool {
    fn name(&self) -> &str {
        "generate_diagram"
    }

    fn description(&self) -> &str {
        "指定されたトピックに基づき、図解（フローチャート等）のMermaidコードを生成する。"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "図解したい内容" },
                "chart_type": {
                    "type": "string",
                    "description": "図の種類",
                    "default": DEFAULT_CHART_TYPE,
                    "enum": CHART_TYPES,
                }
            },
            "required": ["query"]
        })
    }

    fn error_label(&self) -> &str {
        "図解生成エラー"
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query = require_query(&params)?;
        let chart_type = params
            .get("chart_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CHART_TYPE);

        let (_, docs) = ctx.find_documents(query).await?;
        if docs.is_empty() {
            return Ok(format!("{}図解生成をスキップします。", NO_RESULTS));
        }

        ctx.generator()
            .generate_infographic_code(&diagram_source_text(&docs), chart_type)
            .await
    }
}

/// Markdown reply for `search_documents`: answer, search conditions (when
/// any were applied) and the top references.
pub fn format_search_answer(
    answer: &str,
    params: &SearchParams,
    docs: &DocumentSearchResult,
) -> String {
    let mut out = vec![
        "## 回答".to_string(),
        String::new(),
        answer.to_string(),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    if params.filter.is_some() || params.order_by.is_some() {
        out.push("### 検索条件".to_string());
        if let Some(filter) = &params.filter {
            out.push(format!("- フィルタ: {}", filter));
        }
        if let Some(order_by) = &params.order_by {
            out.push(format!("- ソート: {}", order_by));
        }
        out.push(String::new());
    }

    out.push("### 参照ドキュメント".to_string());
    for (i, doc) in docs.results.iter().take(MAX_LISTED_REFERENCES).enumerate() {
        out.push(format!("{}. **{}**", i + 1, doc.title));
        if !doc.url.is_empty() {
            out.push(format!("   - URL: {}", doc.url));
        }
    }
    out.push(String::new());

    out.join("\n")
}

/// Numbered document listing used as slide source material.
pub fn slide_source_text(docs: &DocumentSearchResult) -> String {
    let mut parts = vec!["【検索結果】".to_string()];
    for (i, doc) in docs.results.iter().enumerate() {
        parts.push(format!("\n[Document {}] {}", i + 1, doc.title));
        if !doc.content.is_empty() {
            parts.push(format!("内容: {}", doc.content));
        }
        if !doc.url.is_empty() {
            parts.push(format!("URL: {}", doc.url));
        }
    }
    parts.join("\n")
}

/// Document contents joined with blank lines.
pub fn diagram_source_text(docs: &DocumentSearchResult) -> String {
    docs.results
        .iter()
        .filter(|d| !d.content.is_empty())
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The document search, slide draft and diagram tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchDocumentsTool));
        registry.register(Box::new(SlideDraftTool));
        registry.register(Box::new(DiagramTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
