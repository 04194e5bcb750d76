//! Import metadata for the search data store.
//!
//! Scans a bucket for supported documents and writes one JSONL line per
//! document:
//!
//! ```json
//! {"id":"<sha256>","structData":{"date":"2026-01-30","category":"minutes","filename":"docs/20260130_議事録.pdf"},"content":{"mimeType":"application/pdf","uri":"gs://bucket/docs/20260130_議事録.pdf"}}
//! ```
//!
//! Document ids must match `[a-zA-Z0-9-_]*`, so the object name is hashed;
//! the original name is kept in `structData.filename`.

use anyhow::Context;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::Config;
use crate::connector_gcs::{list_objects, GcsObject};
use crate::http::GoogleClient;

/// Supported extensions (lowercase, with dot) and their MIME types.
pub const SUPPORTED_EXTENSIONS: [(&str, &str); 10] = [
    (".pdf", "application/pdf"),
    (".txt", "text/plain"),
    (".md", "text/markdown"),
    (".csv", "text/csv"),
    (".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    (".doc", "application/msword"),
    (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    (".xls", "application/vnd.ms-excel"),
    (".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    (".ppt", "application/vnd.ms-powerpoint"),
];

const FALLBACK_MIME: &str = "application/octet-stream";

/// Filename date patterns, tried in order. Only the first match of each
/// pattern is considered.
static DATE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(\d{4})(\d{2})(\d{2})").unwrap(),
        Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(),
        Regex::new(r"(\d{4})_(\d{2})_(\d{2})").unwrap(),
    ]
});

/// Zero of each BMP run of ten decimal digits that `\d` matches.
const DIGIT_ZEROS: [u32; 37] = [
    0x0030, 0x0660, 0x06F0, 0x07C0, 0x0966, 0x09E6, 0x0A66, 0x0AE6, 0x0B66, 0x0BE6, 0x0C66,
    0x0CE6, 0x0D66, 0x0DE6, 0x0E50, 0x0ED0, 0x0F20, 0x1040, 0x1090, 0x17E0, 0x1810, 0x1946,
    0x19D0, 0x1A80, 0x1A90, 0x1B50, 0x1BB0, 0x1C40, 0x1C50, 0xA620, 0xA8D0, 0xA900, 0xA9D0,
    0xA9F0, 0xAA50, 0xABF0, 0xFF10,
];

/// Category keywords, first match wins.
const CATEGORIES: [(&str, &[&str]); 5] = [
    ("minutes", &["議事録", "minutes", "mtg", "meeting"]),
    ("report", &["報告", "report"]),
    ("manual", &["マニュアル", "manual", "guide"]),
    ("proposal", &["提案", "proposal"]),
    ("morning_meeting", &["朝会", "morning"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub id: String,
    #[serde(rename = "structData")]
    pub struct_data: StructData,
    pub content: ContentRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructData {
    pub date: String,
    pub category: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRef {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub uri: String,
}

/// Lowercase extension with its dot, e.g. `.pdf`. Empty when absent.
pub fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn mime_type_for(name: &str) -> Option<&'static str> {
    let ext = extension(name);
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

pub fn is_supported(name: &str) -> bool {
    mime_type_for(name).is_some()
}

/// Date embedded in a filename as `YYYYMMDD`, `YYYY-MM-DD` or `YYYY_MM_DD`.
///
/// A match that is not a real calendar date falls through to the next
/// pattern.
pub fn extract_date_from_filename(filename: &str) -> Option<NaiveDate> {
    DATE_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(filename)?;
        let year = decimal_number(&caps[1])?;
        let month = decimal_number(&caps[2])?;
        let day = decimal_number(&caps[3])?;
        NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
    })
}

/// Value of a run of decimal digits from any script in [`DIGIT_ZEROS`], so
/// `２０２６` reads as 2026.
fn decimal_number(digits: &str) -> Option<u32> {
    digits.chars().try_fold(0u32, |acc, c| {
        let cp = u32::from(c);
        let zero = DIGIT_ZEROS.iter().find(|&&z| (z..z + 10).contains(&cp))?;
        acc.checked_mul(10)?.checked_add(cp - zero)
    })
}

pub fn categorize_document(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("other")
}

/// Hex SHA-256 of the object name.
pub fn document_id(object_name: &str) -> String {
    hex::encode(Sha256::digest(object_name.as_bytes()))
}

/// Build the entry for one object. `today` is the last-resort date.
pub fn build_entry(object: &GcsObject, bucket: &str, today: NaiveDate) -> MetadataEntry {
    let filename = object.name.rsplit('/').next().unwrap_or(&object.name);

    let date = extract_date_from_filename(filename)
        .or_else(|| object.updated.map(|u| u.date_naive()))
        .unwrap_or(today);

    let mime_type = mime_type_for(&object.name)
        .map(str::to_string)
        .or_else(|| object.content_type.clone().filter(|c| !c.is_empty()))
        .unwrap_or_else(|| FALLBACK_MIME.to_string());

    MetadataEntry {
        id: document_id(&object.name),
        struct_data: StructData {
            date: date.format("%Y-%m-%d").to_string(),
            category: categorize_document(filename).to_string(),
            filename: object.name.clone(),
        },
        content: ContentRef {
            mime_type,
            uri: format!("gs://{}/{}", bucket, object.name),
        },
    }
}

/// Number of objects per extension, sorted by extension.
pub fn extension_counts<'a>(objects: impl IntoIterator<Item = &'a GcsObject>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for object in objects {
        *counts.entry(extension(&object.name)).or_insert(0) += 1;
    }
    counts
}

/// Write entries as JSON Lines. Non-ASCII text is written as-is.
pub fn write_jsonl<W: Write>(entries: &[MetadataEntry], mut out: W) -> anyhow::Result<()> {
    for entry in entries {
        serde_json::to_writer(&mut out, entry)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// `nbrag metadata`: list the bucket and write the JSONL file.
pub async fn run_metadata(
    config: &Config,
    bucket: Option<&str>,
    output: &Path,
    prefix: &str,
) -> anyhow::Result<()> {
    let project_id = config.project_id()?;
    let bucket = match bucket {
        Some(b) => b,
        None => config.bucket()?,
    };

    println!("Project:  {}", project_id);
    println!("Bucket:   {}", bucket);
    println!("Prefix:   {}", if prefix.is_empty() { "(none)" } else { prefix });
    println!("Output:   {}", output.display());
    println!();

    let client = GoogleClient::from_config(config)?;
    let objects = list_objects(&client, bucket, prefix)
        .await
        .with_context(|| format!("Failed to list gs://{}/{}", bucket, prefix))?;

    let supported: Vec<&GcsObject> = objects.iter().filter(|o| is_supported(&o.name)).collect();
    println!("Found {} supported files", supported.len());
    for (ext, count) in extension_counts(supported.iter().copied()) {
        println!("  {}: {}", ext, count);
    }
    println!();

    if supported.is_empty() {
        let exts: Vec<&str> = SUPPORTED_EXTENSIONS.iter().map(|(e, _)| *e).collect();
        println!("Warning: no supported files found (supported: {})", exts.join(", "));
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    let entries: Vec<MetadataEntry> = supported
        .iter()
        .map(|o| build_entry(o, bucket, today))
        .collect();
    for entry in &entries {
        println!(
            "  {} (date: {}, type: {})",
            entry.struct_data.filename, entry.struct_data.date, entry.content.mime_type
        );
    }

    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    write_jsonl(&entries, std::io::BufWriter::new(file))?;

    println!();
    println!("Wrote {} entries to {}", entries.len(), output.display());
    println!("Next: upload the file to the bucket, import it into the data store, and mark");
    println!("the 'date' field as filterable and sortable in the schema.");
    Ok(())
}
