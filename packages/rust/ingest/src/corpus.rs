//! Corpus builder: normalize every source, collect skips, sort by recency.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kbchat_shared::{IngestMode, KbChatError, KnowledgeDocument, Result, SkipRecord};

use crate::normalizer::{RawSource, normalize};

/// File extension of source blobs in a data directory.
const SOURCE_EXTENSION: &str = "json";

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// An immutable, recency-ordered collection of documents plus its skip report.
///
/// Documents are sorted by `date_code` descending. The sort is stable, so
/// documents with equal codes keep the order their sources were enumerated in.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<KnowledgeDocument>,
    skipped: Vec<SkipRecord>,
}

impl Corpus {
    /// Create a corpus, establishing the recency order.
    pub fn new(mut documents: Vec<KnowledgeDocument>, skipped: Vec<SkipRecord>) -> Self {
        documents.sort_by(|a, b| b.date_code.cmp(&a.date_code));
        Self { documents, skipped }
    }

    pub fn documents(&self) -> &[KnowledgeDocument] {
        &self.documents
    }

    pub fn skipped(&self) -> &[SkipRecord] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up a document by id.
    pub fn get(&self, id: &str) -> Option<&KnowledgeDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Split the corpus back into its parts.
    pub fn into_parts(self) -> (Vec<KnowledgeDocument>, Vec<SkipRecord>) {
        (self.documents, self.skipped)
    }

    /// Empty corpus with skipped sources: ingestion itself is broken.
    pub fn is_degraded(&self) -> bool {
        self.documents.is_empty() && !self.skipped.is_empty()
    }

    /// Aggregate numbers for the operator report.
    pub fn stats(&self) -> CorpusStats {
        let mut by_type = BTreeMap::new();
        for doc in &self.documents {
            *by_type.entry(doc.doc_type.clone()).or_insert(0) += 1;
        }

        CorpusStats {
            documents: self.documents.len(),
            by_type,
            newest_date_code: self
                .documents
                .iter()
                .map(|d| d.date_code)
                .filter(|c| *c > 0)
                .max(),
            skipped: self.skipped.len(),
            skipped_sources: self.skipped.iter().map(|s| s.source_file.clone()).collect(),
        }
    }
}

/// Summary of a corpus for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    /// Number of documents.
    pub documents: usize,
    /// Document count per type tag.
    pub by_type: BTreeMap<String, usize>,
    /// Largest non-zero date code, if any.
    pub newest_date_code: Option<u32>,
    /// Number of skipped sources.
    pub skipped: usize,
    /// Names of skipped sources, in enumeration order.
    pub skipped_sources: Vec<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Normalize every source into one corpus.
///
/// A source that fails to normalize is recorded in the skip report and never
/// stops the remaining sources from loading. Duplicate ids are made unique by
/// suffixing `-2`, `-3`, ... so every id in the corpus is distinct.
#[instrument(skip_all, fields(mode = %mode))]
pub fn build_corpus<I>(sources: I, mode: IngestMode) -> Corpus
where
    I: IntoIterator<Item = RawSource>,
{
    let start = Instant::now();
    let mut documents = Vec::new();
    let mut skipped = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut source_count = 0usize;

    for source in sources {
        source_count += 1;
        match normalize(&source, mode) {
            Ok(docs) => {
                debug!(source = %source.name, documents = docs.len(), "normalized source");
                for mut doc in docs {
                    doc.id = unique_id(&doc.id, &seen_ids);
                    seen_ids.insert(doc.id.clone());
                    documents.push(doc);
                }
            }
            Err(skip) => {
                warn!(source = %skip.source_file, reason = %skip.reason, "skipping broken source");
                skipped.push(skip);
            }
        }
    }

    let corpus = Corpus::new(documents, skipped);

    info!(
        sources = source_count,
        documents = corpus.len(),
        skipped = corpus.skipped().len(),
        elapsed_ms = start.elapsed().as_millis(),
        "corpus built"
    );
    if corpus.is_degraded() {
        warn!("every source was skipped; check the data files");
    }

    corpus
}

fn unique_id(id: &str, seen: &HashSet<String>) -> String {
    if !seen.contains(id) {
        return id.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{id}-{n}");
        if !seen.contains(&candidate) {
            warn!(id, renamed = %candidate, "duplicate document id");
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Directory intake
// ---------------------------------------------------------------------------

/// Read every `*.json` file in `dir` as a raw source, ordered by file name.
///
/// A file that cannot be read becomes an unreadable source carrying the I/O
/// error, so it lands in the skip report instead of aborting the load.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_sources(dir: &Path) -> Result<Vec<RawSource>> {
    let entries = std::fs::read_dir(dir).map_err(|e| KbChatError::io(dir, e))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| match entry {
            Ok(e) => Some(e.path()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                None
            }
        })
        .filter(|path| path.is_file() && has_source_extension(path))
        .collect();
    paths.sort();

    let sources = paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match std::fs::read(path) {
                Ok(body) => RawSource::from_bytes(name, body),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read source file");
                    RawSource::unreadable(name, e.to_string())
                }
            }
        })
        .collect::<Vec<_>>();

    debug!(count = sources.len(), "source files found");
    Ok(sources)
}

/// Load and build the corpus for a data directory.
pub fn load_corpus(dir: &Path, mode: IngestMode) -> Result<Corpus> {
    Ok(build_corpus(load_sources(dir)?, mode))
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        .unwrap_or(false)
}
