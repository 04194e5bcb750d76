//! Generation gateway: prompt templates over a Gemini model.
//!
//! [`ContentGenerator`] owns four fixed prompt templates. Slides, diagrams
//! and contextual answers return the model output untouched; search
//! parameter extraction parses the output as JSON and falls back to the
//! raw user query when the model does not cooperate.
//!
//! Prompts are written in Japanese to match the document corpus.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::GoogleClient;
use crate::models::{DocumentResult, SearchParams};

const SERVICE: &str = "generation";

/// Diagram kinds with a dedicated description; anything else is passed
/// through as `"{kind}図"`.
pub const CHART_TYPES: [&str; 7] = [
    "flowchart",
    "sequence",
    "mindmap",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "gantt",
];

pub const DEFAULT_CHART_TYPE: &str = "flowchart";

/// Transport seam for text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// [`TextGenerator`] backed by Vertex AI `generateContent`.
pub struct GeminiGenerator {
    client: GoogleClient,
    url: String,
}

impl GeminiGenerator {
    pub fn new(client: GoogleClient, project_id: &str, region: &str, model: &str) -> Self {
        let url = format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{region}/publishers/google/models/{model}:generateContent"
        );
        Self { client, url }
    }

    pub fn from_config(client: GoogleClient, config: &Config) -> Result<Self> {
        Ok(Self::new(
            client,
            config.project_id()?,
            &config.gcp.region,
            &config.generation.model,
        ))
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let resp = self.client.post_json(SERVICE, &self.url, &body).await?;
        candidate_text(&resp)
    }
}

/// Concatenate the text parts of the first candidate. A candidate with no
/// text part (e.g. stopped for safety) is a backend error.
pub fn candidate_text(response: &Value) -> Result<String> {
    let Some(candidate) = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        let reason = response
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned");
        return Err(Error::Backend {
            service: SERVICE,
            status: 200,
            code: String::new(),
            message: reason.to_string(),
        });
    };

    let texts: Vec<&str> = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("FINISH_REASON_UNSPECIFIED");
        return Err(Error::Backend {
            service: SERVICE,
            status: 200,
            code: reason.to_string(),
            message: "candidate has no text parts".to_string(),
        });
    }
    Ok(texts.concat())
}

pub struct ContentGenerator<G> {
    generator: G,
}

/// Generator over a shared, type-erased backend.
pub type SharedContentGenerator = ContentGenerator<Arc<dyn TextGenerator>>;

impl<G: TextGenerator> ContentGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Marp-compatible slide outline for `source_text`.
    pub async fn generate_slide_markdown(&self, source_text: &str) -> Result<String> {
        self.generator
            .generate(&build_slide_prompt(source_text))
            .await
    }

    /// Mermaid diagram code explaining `source_text`.
    pub async fn generate_infographic_code(
        &self,
        source_text: &str,
        chart_type: &str,
    ) -> Result<String> {
        self.generator
            .generate(&build_infographic_prompt(source_text, chart_type))
            .await
    }

    /// Answer `query` using only the given documents.
    pub async fn generate_answer_from_context(
        &self,
        query: &str,
        results: &[DocumentResult],
    ) -> Result<String> {
        self.generator
            .generate(&build_answer_prompt(query, results))
            .await
    }

    /// Extract a search query, filter and ordering from a natural-language
    /// request, relative to today's date.
    pub async fn generate_search_params(&self, user_query: &str) -> Result<SearchParams> {
        let today = chrono::Local::now().date_naive();
        self.generate_search_params_on(user_query, today).await
    }

    /// [`Self::generate_search_params`] with an explicit reference date.
    pub async fn generate_search_params_on(
        &self,
        user_query: &str,
        today: NaiveDate,
    ) -> Result<SearchParams> {
        let raw = self
            .generator
            .generate(&build_search_params_prompt(user_query, today))
            .await?;
        Ok(parse_search_params(&raw, user_query))
    }
}

pub fn build_slide_prompt(source_text: &str) -> String {
    let instructions = [
        "以下の情報を元に、プレゼンテーション用のスライド構成を作成してください。",
        "",
        "【出力要件】",
        "- Marpに対応したMarkdown形式で出力してください",
        "- 各スライドは `---` で区切ってください",
        "- 最初のスライドにはタイトルと概要を含めてください",
        "- 内容は箇条書きで整理してください",
        "- 最後のスライドにはまとめ・結論を含めてください",
        "- スライドは5〜8枚程度にまとめてください",
        "",
        "【入力情報】",
    ]
    .join("\n");
    let output_format = [
        "",
        "",
        "【出力形式】",
        "Markdownテキストのみを出力してください。説明や補足は不要です。",
        "最初の行は `---` から始め、Marpのフロントマターを含めてください。",
        "",
        "例:",
        "---",
        "marp: true",
        "theme: default",
        "paginate: true",
        "---",
        "",
        "# タイトル",
        "",
        "概要テキスト",
        "",
        "---",
        "",
        "## セクション1",
        "",
        "- ポイント1",
        "- ポイント2",
        "",
        "---",
    ]
    .join("\n");
    format!("{}\n{}{}", instructions, source_text, output_format)
}

/// Natural-language name of a Mermaid diagram kind.
pub fn chart_description(chart_type: &str) -> String {
    match chart_type {
        "flowchart" => "フローチャート（flowchart TD または flowchart LR）".to_string(),
        "sequence" => "シーケンス図（sequenceDiagram）".to_string(),
        "mindmap" => "マインドマップ（mindmap）".to_string(),
        "classDiagram" => "クラス図（classDiagram）".to_string(),
        "stateDiagram" => "状態遷移図（stateDiagram-v2）".to_string(),
        "erDiagram" => "ER図（erDiagram）".to_string(),
        "gantt" => "ガントチャート（gantt）".to_string(),
        other => format!("{}図", other),
    }
}

pub fn build_infographic_prompt(source_text: &str, chart_type: &str) -> String {
    let heading = format!(
        "以下のテキストの内容を説明する{}を作成してください。",
        chart_description(chart_type)
    );
    let instructions = [
        heading.as_str(),
        "",
        "【出力要件】",
        "- 出力はMermaid.jsの構文のみにしてください",
        "- Markdownのコードブロック ```mermaid で囲んでください",
        "- ノードのラベルには日本語を使用してください",
        "- 図は見やすく構造化してください",
        "- 重要なポイントや関係性を明確に表現してください",
        "",
        "【入力情報】",
    ]
    .join("\n");
    let output_format = [
        "",
        "",
        "【出力形式】",
        "Mermaid.jsのコードブロックのみを出力してください。説明や補足は不要です。",
        "",
        "例:",
        "```mermaid",
        "flowchart TD",
        "    A[開始] --> B[処理1]",
        "    B --> C{条件分岐}",
        "    C -->|Yes| D[処理2]",
        "    C -->|No| E[処理3]",
        "    D --> F[終了]",
        "    E --> F",
        "```",
    ]
    .join("\n");
    format!("{}\n{}{}", instructions, source_text, output_format)
}

pub fn build_answer_prompt(query: &str, results: &[DocumentResult]) -> String {
    let context = results
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "[Document {}] {}\nURL: {}\n内容: {}",
                i + 1,
                doc.title,
                doc.url,
                doc.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    [
        "あなたは社内ドキュメントに基づいて質問に回答するアシスタントです。",
        "以下の検索結果のみを根拠として、質問に日本語で回答してください。",
        "",
        "【回答要件】",
        "- 検索結果に書かれていない内容は推測せず、「資料からは判断できません」と答えてください",
        "- 根拠としたドキュメントを [Document 番号] の形式で示してください",
        "- 日付や数値は資料の記載どおりに引用してください",
        "- 箇条書きを使って簡潔にまとめてください",
        "",
        "【質問】",
        query,
        "",
        "【検索結果】",
        context.as_str(),
    ]
    .join("\n")
}

pub fn build_search_params_prompt(user_query: &str, today: NaiveDate) -> String {
    let today_line = format!("今日の日付: {}", today.format("%Y-%m-%d"));
    [
        "あなたは検索クエリを解析するアシスタントです。",
        "ユーザーの依頼から、検索キーワード・日付フィルタ・並び順を抽出してください。",
        "",
        today_line.as_str(),
        "",
        "【ルール】",
        "- query: 日付や並び順の表現を除いた検索キーワード",
        "- 日付範囲の指定がある場合（例: 1/26〜1/30）: filter を date >= \"YYYY-MM-DD\" AND date <= \"YYYY-MM-DD\" とする",
        "- 特定の日付の指定がある場合: filter を date = \"YYYY-MM-DD\" とする",
        "- 年が省略されている場合は今日の日付から最も自然な年を補う",
        "- 「最新」「最近」「直近」などの表現がある場合: order_by を \"date desc\" とする",
        "- 「古い順」「時系列」などの表現がある場合: order_by を \"date asc\" とする",
        "- 日付に関する表現がない場合: filter と order_by は null とする",
        "",
        "【出力形式】",
        "次のキーを持つJSONのみを出力してください。説明は不要です。",
        "{\"query\": \"...\", \"filter\": \"...\" または null, \"order_by\": \"...\" または null}",
        "",
        "【ユーザーの依頼】",
        user_query,
    ]
    .join("\n")
}

/// Remove a surrounding ```` ```json ```` or ```` ``` ```` fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Interpret model output as [`SearchParams`].
///
/// Never fails: unparseable output yields the user query unchanged with no
/// filter or ordering, and each missing or empty key falls back the same
/// way.
pub fn parse_search_params(raw: &str, user_query: &str) -> SearchParams {
    let parsed: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "search params output is not JSON");
            return SearchParams::passthrough(user_query);
        }
    };
    let Some(obj) = parsed.as_object() else {
        return SearchParams::passthrough(user_query);
    };

    let field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    SearchParams {
        query: field("query").unwrap_or_else(|| user_query.to_string()),
        filter: field("filter"),
        order_by: field("order_by"),
    }
}
