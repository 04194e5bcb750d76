//! Parsing of Discovery Engine search responses.
//!
//! Result documents carry their useful fields inside a loosely typed
//! `derivedStructData` object whose shape depends on the data store and on
//! which content specs were requested. Text extraction follows a fixed
//! contract:
//!
//! 1. Source lists are read in order: `extractive_segments`,
//!    `extractive_answers`, `snippets`.
//! 2. For each source object the first non-empty string among
//!    [`CONTENT_FIELDS`] is used.
//! 3. Otherwise the longest string value of the object is used if it is
//!    longer than [`MIN_FALLBACK_CHARS`] characters; shorter strings are
//!    treated as noise (ids, statuses, page numbers).
//!
//! Extracted parts have `<b>` highlight tags removed, newlines flattened to
//! spaces, and are joined with a blank line.

use serde_json::{Map, Value};

use crate::models::{DocumentResult, DocumentSearchResult, SearchCitation, SearchResult, UNTITLED};

/// Source lists inside `derivedStructData`, in extraction order.
pub const SOURCE_LISTS: [&str; 3] = ["extractive_segments", "extractive_answers", "snippets"];

/// Content-bearing field names, in priority order.
pub const CONTENT_FIELDS: [&str; 4] = ["content", "snippet", "htmlSnippet", "text"];

/// Fallback strings must be strictly longer than this many characters.
pub const MIN_FALLBACK_CHARS: usize = 10;

/// Parse a search-and-answer response into summary text and citations.
///
/// A missing summary yields an empty string. Results without a title and
/// without a link are skipped; a result with only a link gets [`UNTITLED`].
pub fn parse_search_result(response: &Value) -> SearchResult {
    let summary = response
        .get("summary")
        .and_then(|s| s.get("summaryText"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut citations = Vec::new();
    for result in results(response) {
        let Some(data) = result.get("document").and_then(derived_data) else {
            continue;
        };

        let title = data.get("title").map(value_text).unwrap_or_default();
        let url = data.get("link").map(value_text).unwrap_or_default();
        if title.is_empty() && url.is_empty() {
            continue;
        }

        citations.push(SearchCitation {
            title: if title.is_empty() {
                UNTITLED.to_string()
            } else {
                title
            },
            url,
        });
    }

    SearchResult { summary, citations }
}

/// Parse a document search response into one [`DocumentResult`] per result.
///
/// Results lacking a document or derived metadata are skipped; documents
/// with no extractable text are kept with the no-content marker.
pub fn parse_document_results(response: &Value) -> DocumentSearchResult {
    let mut documents = Vec::new();

    for result in results(response) {
        let Some(data) = result.get("document").and_then(derived_data) else {
            continue;
        };

        let title = data
            .get("title")
            .filter(|v| !v.is_null())
            .map(value_text)
            .unwrap_or_else(|| UNTITLED.to_string());
        let url = data.get("link").map(value_text).unwrap_or_default();

        let parts: Vec<String> = SOURCE_LISTS
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_array))
            .flatten()
            .filter_map(extract_text)
            .map(|text| clean_text(&text))
            .collect();

        documents.push(DocumentResult::new(title, parts.join("\n\n"), url));
    }

    DocumentSearchResult { results: documents }
}

/// Pull the text out of one extractive segment/answer/snippet object.
pub fn extract_text(source: &Value) -> Option<String> {
    let obj = source.as_object()?;

    for field in CONTENT_FIELDS {
        if let Some(text) = obj.get(field).and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }

    let mut longest: &str = "";
    for value in obj.values() {
        if let Some(s) = value.as_str() {
            if s.chars().count() > longest.chars().count() {
                longest = s;
            }
        }
    }
    (longest.chars().count() > MIN_FALLBACK_CHARS).then(|| longest.to_string())
}

fn clean_text(text: &str) -> String {
    text.replace("<b>", "")
        .replace("</b>", "")
        .replace('\n', " ")
}

fn results(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// The document's derived metadata, if present and non-empty.
fn derived_data(document: &Value) -> Option<&Map<String, Value>> {
    document
        .get("derivedStructData")
        .or_else(|| document.get("derived_struct_data"))
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NO_CONTENT;
    use serde_json::json;

    fn result_with(data: Value) -> Value {
        json!({ "id": "1", "document": { "id": "1", "derivedStructData": data } })
    }

    #[test]
    fn test_absent_summary_is_empty_string() {
        let parsed = parse_search_result(&json!({}));
        assert_eq!(parsed, SearchResult::default());
        assert_eq!(parsed.summary, "");
    }

    #[test]
    fn test_summary_and_citations() {
        let resp = json!({
            "summary": { "summaryText": "回答です" },
            "results": [
                result_with(json!({ "title": "資料A", "link": "gs://b/a.pdf" })),
                result_with(json!({ "link": "gs://b/b.pdf" })),
                result_with(json!({ "snippets": [] })),
                { "id": "no-document" },
            ]
        });
        let parsed = parse_search_result(&resp);
        assert_eq!(parsed.summary, "回答です");
        assert_eq!(
            parsed.citations,
            vec![
                SearchCitation {
                    title: "資料A".to_string(),
                    url: "gs://b/a.pdf".to_string()
                },
                SearchCitation {
                    title: UNTITLED.to_string(),
                    url: "gs://b/b.pdf".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_title_only_citation_has_empty_url() {
        let resp = json!({ "results": [result_with(json!({ "title": "T" }))] });
        let parsed = parse_search_result(&resp);
        assert_eq!(parsed.citations[0].url, "");
    }

    #[test]
    fn test_document_content_from_known_fields() {
        let resp = json!({
            "results": [result_with(json!({
                "title": "議事録",
                "link": "gs://b/m.pdf",
                "extractive_segments": [{ "content": "segment <b>one</b>\nline" }],
                "extractive_answers": [{ "content": "answer", "pageNumber": "3" }],
                "snippets": [{ "snippet": "snip", "snippet_status": "SUCCESS" }],
            }))]
        });
        let docs = parse_document_results(&resp);
        assert_eq!(docs.results.len(), 1);
        let doc = &docs.results[0];
        assert_eq!(doc.title, "議事録");
        assert_eq!(doc.url, "gs://b/m.pdf");
        assert_eq!(doc.content, "segment one line\n\nanswer\n\nsnip");
    }

    #[test]
    fn test_field_priority_order() {
        let src = json!({ "text": "t", "htmlSnippet": "h", "snippet": "s" });
        assert_eq!(extract_text(&src).as_deref(), Some("s"));
        let src = json!({ "content": "", "htmlSnippet": "h" });
        assert_eq!(extract_text(&src).as_deref(), Some("h"));
    }

    #[test]
    fn test_longest_string_fallback() {
        let src = json!({ "id": "abc", "body": "a much longer passage of text", "n": 5 });
        assert_eq!(
            extract_text(&src).as_deref(),
            Some("a much longer passage of text")
        );
    }

    #[test]
    fn test_short_strings_are_noise() {
        let src = json!({ "status": "SUCCESS", "id": "0123456789" });
        assert_eq!(extract_text(&src), None);
    }

    #[test]
    fn test_fallback_counts_characters_not_bytes() {
        // 6 characters, 18 bytes
        let src = json!({ "x": "日本語の文章" });
        assert_eq!(extract_text(&src), None);
    }

    #[test]
    fn test_non_object_source_yields_nothing() {
        assert_eq!(extract_text(&json!("a plain string that is long")), None);
    }

    #[test]
    fn test_document_without_text_gets_marker() {
        let resp = json!({
            "results": [result_with(json!({
                "link": "gs://b/empty.pdf",
                "snippets": [{ "snippet_status": "NO_SNIPPET" }]
            }))]
        });
        let docs = parse_document_results(&resp);
        assert_eq!(docs.results[0].title, UNTITLED);
        assert_eq!(docs.results[0].content, NO_CONTENT);
    }

    #[test]
    fn test_results_without_metadata_are_skipped() {
        let resp = json!({
            "results": [
                { "id": "a" },
                { "id": "b", "document": { "id": "b" } },
                { "id": "c", "document": { "derivedStructData": {} } },
                result_with(json!({ "title": "kept" })),
            ]
        });
        let docs = parse_document_results(&resp);
        assert_eq!(docs.results.len(), 1);
        assert_eq!(docs.results[0].title, "kept");
    }

    #[test]
    fn test_backend_order_preserved() {
        let resp = json!({
            "results": [
                result_with(json!({ "title": "3" })),
                result_with(json!({ "title": "1" })),
                result_with(json!({ "title": "2" })),
            ]
        });
        let titles: Vec<_> = parse_document_results(&resp)
            .results
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["3", "1", "2"]);
    }
}
