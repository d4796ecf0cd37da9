//! Raw source → [`KnowledgeDocument`] normalization.
//!
//! A source blob holds either one object-shaped record or a list of fragment
//! records (one per caption line, for instance). The blob is parsed once into
//! a [`RawRecord`] and dispatched on its shape; both shapes share the same
//! field lookups and fallbacks.

use std::path::Path;

use serde_json::Value;

use kbchat_shared::{IngestMode, KnowledgeDocument, SkipRecord, TYPE_BLOG, TYPE_YOUTUBE};

use crate::date_code::date_code_from_name;

/// Fields holding the document body, in priority order.
const BODY_FIELDS: &[&str] = &["content", "text", "raw_content", "description"];

/// Fields holding a source link, in priority order.
const URL_FIELDS: &[&str] = &["url", "url_full", "original_url"];

/// Fields holding an explicit recency key.
const DATE_CODE_FIELDS: &[&str] = &["dateCode", "date_code"];

/// Pre-formatted fragment timestamp (`"03:15"`).
const TIMESTAMP_FIELD: &str = "timestamp_str";

/// Fragment start offset in seconds, used when no formatted timestamp exists.
const START_SECONDS_FIELD: &str = "start";

/// UTF-8 byte order mark some editors prepend to JSON files.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A named, unparsed source blob (conceptually one file).
#[derive(Debug, Clone)]
pub struct RawSource {
    /// Originating identifier, usually the file name.
    pub name: String,
    /// Raw bytes of the structured text.
    pub body: Vec<u8>,
    /// Why the bytes could not be read, if they could not.
    pub read_error: Option<String>,
}

impl RawSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: text.into().into_bytes(),
            read_error: None,
        }
    }

    pub fn from_bytes(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body,
            read_error: None,
        }
    }

    /// A source whose file could not be read; it normalizes to a skip.
    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
            read_error: Some(reason.into()),
        }
    }
}

/// Parsed shape of a source blob.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// One record whose fields populate one document.
    SingleRecord(Value),
    /// Several fragment records describing one source.
    FragmentList(Vec<Value>),
}

impl RawRecord {
    /// Parse structured text into a record, tolerating a leading BOM.
    pub fn parse(body: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
        let value: Value = serde_json::from_slice(body)?;
        Ok(match value {
            Value::Array(items) => Self::FragmentList(items),
            other => Self::SingleRecord(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Per-source context
// ---------------------------------------------------------------------------

/// Values derived from the source name, shared by every document it yields.
#[derive(Debug, Clone)]
struct SourceContext {
    source_file: String,
    stem: String,
    date_code: u32,
    default_type: &'static str,
}

impl SourceContext {
    fn new(source_file: &str) -> Self {
        let path = Path::new(source_file);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source_file.to_string());
        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| file_name.clone());

        let default_type = if file_name.to_lowercase().contains(TYPE_YOUTUBE) {
            TYPE_YOUTUBE
        } else {
            TYPE_BLOG
        };

        Self {
            source_file: source_file.to_string(),
            date_code: date_code_from_name(&file_name),
            stem,
            default_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize one raw source into documents.
///
/// Returns a [`SkipRecord`] when the blob is not valid structured text. An
/// empty fragment list yields no documents and is not a skip.
pub fn normalize(
    source: &RawSource,
    mode: IngestMode,
) -> std::result::Result<Vec<KnowledgeDocument>, SkipRecord> {
    if let Some(reason) = &source.read_error {
        return Err(SkipRecord::new(&source.name, format!("unreadable: {reason}")));
    }

    let record = RawRecord::parse(&source.body)
        .map_err(|e| SkipRecord::new(&source.name, e.to_string()))?;

    Ok(normalize_record(&record, &source.name, mode))
}

/// Normalize an already-parsed record.
pub fn normalize_record(
    record: &RawRecord,
    source_file: &str,
    mode: IngestMode,
) -> Vec<KnowledgeDocument> {
    let ctx = SourceContext::new(source_file);

    match (record, mode) {
        (RawRecord::SingleRecord(value), _) => {
            vec![document_from_record(value, &ctx, ctx.source_file.clone())]
        }
        (RawRecord::FragmentList(fragments), IngestMode::Merged) => {
            merge_fragments(fragments, &ctx).into_iter().collect()
        }
        (RawRecord::FragmentList(fragments), IngestMode::PerFragment) => fragments
            .iter()
            .enumerate()
            .map(|(i, fragment)| {
                document_from_record(fragment, &ctx, format!("{}-{i}", ctx.source_file))
            })
            .collect(),
    }
}

/// Build one document from one record's own fields.
fn document_from_record(
    record: &Value,
    ctx: &SourceContext,
    fallback_id: String,
) -> KnowledgeDocument {
    KnowledgeDocument {
        id: string_field(record, "id").unwrap_or(fallback_id),
        title: string_field(record, "title").unwrap_or_else(|| ctx.stem.clone()),
        content: fragment_line(record).unwrap_or_else(|| record.to_string()),
        doc_type: string_field(record, "type").unwrap_or_else(|| ctx.default_type.to_string()),
        url: first_field(record, URL_FIELDS).unwrap_or_default(),
        date_code: explicit_date_code(record).unwrap_or(ctx.date_code),
        source_file: ctx.source_file.clone(),
    }
}

/// Collapse every fragment of a source into a single document.
fn merge_fragments(fragments: &[Value], ctx: &SourceContext) -> Option<KnowledgeDocument> {
    if fragments.is_empty() {
        return None;
    }

    let lines: Vec<String> = fragments.iter().filter_map(fragment_line).collect();
    let content = if lines.is_empty() {
        Value::Array(fragments.to_vec()).to_string()
    } else {
        lines.join("\n")
    };

    Some(KnowledgeDocument {
        id: ctx.source_file.clone(),
        title: fragments
            .iter()
            .find_map(|f| string_field(f, "title"))
            .unwrap_or_else(|| ctx.stem.clone()),
        content,
        doc_type: fragments
            .iter()
            .find_map(|f| string_field(f, "type"))
            .unwrap_or_else(|| ctx.default_type.to_string()),
        url: fragments
            .iter()
            .find_map(|f| first_field(f, URL_FIELDS))
            .unwrap_or_default(),
        date_code: fragments
            .iter()
            .find_map(explicit_date_code)
            .unwrap_or(ctx.date_code),
        source_file: ctx.source_file.clone(),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Body text of a record, prefixed with `[mm:ss] ` when it carries a timestamp.
///
/// A bare string record is its own body.
fn fragment_line(record: &Value) -> Option<String> {
    let body = match record {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => BODY_FIELDS.iter().find_map(|key| body_field(record, key)),
    }?;

    match timestamp(record) {
        Some(ts) => Some(format!("[{ts}] {body}")),
        None => Some(body),
    }
}

fn timestamp(record: &Value) -> Option<String> {
    if let Some(ts) = string_field(record, TIMESTAMP_FIELD) {
        return Some(ts);
    }
    let secs = record.get(START_SECONDS_FIELD)?.as_f64()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let secs = secs as u64;
    Some(format!("{:02}:{:02}", secs / 60, secs % 60))
}

/// Body-like field: kept untrimmed, but blank values count as absent.
fn body_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Short scalar field (id, title, url, type), trimmed; numbers are stringified.
fn string_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| string_field(record, key))
}

/// Explicit positive date code on the record, if any.
fn explicit_date_code(record: &Value) -> Option<u32> {
    DATE_CODE_FIELDS
        .iter()
        .find_map(|key| match record.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|code| *code > 0)
}
