//! Core domain types for the kbchat retrieval layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KbChatError;

/// Type tag assigned to documents whose source name mentions YouTube.
pub const TYPE_YOUTUBE: &str = "youtube";

/// Type tag assigned to every other document.
pub const TYPE_BLOG: &str = "blog";

// ---------------------------------------------------------------------------
// KnowledgeDocument
// ---------------------------------------------------------------------------

/// The unit of retrieval: one normalized document in the corpus.
///
/// Serialized field names follow the source record shape (`dateCode`,
/// `sourceFile`, `type`) so a document can be written back out as a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    /// Unique identifier within the corpus.
    pub id: String,
    /// Human-readable label.
    pub title: String,
    /// Full text body, used for scoring and for context injection.
    pub content: String,
    /// Classification tag (`youtube`, `blog`, ...).
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Source link, empty when unknown.
    #[serde(default)]
    pub url: String,
    /// `YYYYMM` recency key, `0` when undeterminable.
    #[serde(default)]
    pub date_code: u32,
    /// Originating source identifier.
    #[serde(default)]
    pub source_file: String,
}

impl KnowledgeDocument {
    /// Human-readable recency marker (`2025-12`), or `unknown` for code 0.
    pub fn recency_label(&self) -> String {
        format_date_code(self.date_code)
    }
}

/// Render a `YYYYMM` date code as `YYYY-MM`.
///
/// Codes that do not have six digits are rendered verbatim; `0` is `unknown`.
pub fn format_date_code(code: u32) -> String {
    match code {
        0 => "unknown".to_string(),
        100_000..=999_999 => format!("{}-{:02}", code / 100, code % 100),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SkipRecord
// ---------------------------------------------------------------------------

/// A raw source that was excluded from the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    /// Name of the source that failed.
    pub source_file: String,
    /// Why it was skipped (parser message, encoding error).
    pub reason: String,
}

impl SkipRecord {
    pub fn new(source_file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source_file, self.reason)
    }
}

// ---------------------------------------------------------------------------
// IngestMode
// ---------------------------------------------------------------------------

/// How fragment lists are turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    /// All fragments of one source collapse into a single document.
    #[default]
    Merged,
    /// Each fragment becomes its own retrievable document.
    PerFragment,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::PerFragment => "per-fragment",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestMode {
    type Err = KbChatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "merged" => Ok(Self::Merged),
            "per-fragment" | "fragment" => Ok(Self::PerFragment),
            other => Err(KbChatError::config(format!(
                "unknown ingest mode '{other}': expected 'merged' or 'per-fragment'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SynonymGroup
// ---------------------------------------------------------------------------

/// One row of the synonym table used by the ranker.
///
/// A query token listed in `triggers` earns the synonym bonus when the
/// document contains any of the `markers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymGroup {
    /// Canonical group name (e.g. `price`).
    pub name: String,
    /// Query tokens that activate the group.
    pub triggers: Vec<String>,
    /// Document terms that satisfy the group.
    pub markers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Speaker of a conversation turn, as understood by the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A single turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
