//! Cloud Storage object listing.
//!
//! Uses the JSON API (`GET storage/v1/b/{bucket}/o`) and follows
//! `nextPageToken` until the listing is exhausted. Only object metadata is
//! read; contents are never downloaded.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::http::GoogleClient;

const SERVICE: &str = "storage";
const MAX_RESULTS: &str = "1000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsObject {
    /// Full object path within the bucket, e.g. `minutes/20260130_定例.pdf`.
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

pub fn list_url(bucket: &str) -> String {
    format!("https://storage.googleapis.com/storage/v1/b/{}/o", bucket)
}

/// List every object in `bucket` whose name starts with `prefix`.
pub async fn list_objects(client: &GoogleClient, bucket: &str, prefix: &str) -> Result<Vec<GcsObject>> {
    let url = list_url(bucket);
    let mut objects = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut query = vec![("maxResults", MAX_RESULTS)];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        if let Some(ref token) = page_token {
            query.push(("pageToken", token.as_str()));
        }

        let body = client.get_json(SERVICE, &url, &query).await?;
        let page: ListPage = serde_json::from_value(body)?;
        objects.extend(page.items);

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    tracing::debug!(bucket, prefix, count = objects.len(), "listed objects");
    Ok(objects)
}
