//! Atomically swapped corpus snapshots with administrative edits.
//!
//! Readers take an `Arc<Corpus>` and rank against it for as long as they
//! like. Edits never touch a published snapshot: they build a new corpus and
//! swap the reference, so a ranking call always sees one consistent corpus.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;
use uuid::Uuid;

use kbchat_ingest::Corpus;
use kbchat_shared::{KbChatError, KnowledgeDocument, Result, TYPE_BLOG};

/// `source_file` recorded on documents added by an administrator.
pub const ADMIN_SOURCE: &str = "admin";

/// Fields supplied by an administrator when adding a document.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    pub url: String,
    pub content: String,
    /// Type tag; defaults to `blog`.
    pub doc_type: Option<String>,
}

/// Owner of the current corpus snapshot.
#[derive(Debug)]
pub struct CorpusStore {
    current: RwLock<Arc<Corpus>>,
}

impl CorpusStore {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// The snapshot to use for one ranking call.
    pub fn snapshot(&self) -> Arc<Corpus> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a whole new corpus, returning the previous one.
    pub fn replace(&self, corpus: Corpus) -> Arc<Corpus> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(corpus))
    }

    /// Add a document and publish the new snapshot.
    ///
    /// Title and content must be non-blank. The document gets a fresh UUID v7
    /// id and date code `0`, so it sorts after every dated document.
    pub fn add(&self, new: NewDocument) -> Result<KnowledgeDocument> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(KbChatError::validation("document title must not be empty"));
        }
        if new.content.trim().is_empty() {
            return Err(KbChatError::validation("document content must not be empty"));
        }

        let document = KnowledgeDocument {
            id: Uuid::now_v7().to_string(),
            title: title.to_string(),
            content: new.content,
            doc_type: new
                .doc_type
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| TYPE_BLOG.to_string()),
            url: new.url.trim().to_string(),
            date_code: 0,
            source_file: ADMIN_SOURCE.to_string(),
        };

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let (mut documents, skipped) = current.as_ref().clone().into_parts();
        documents.push(document.clone());
        *current = Arc::new(Corpus::new(documents, skipped));

        info!(id = %document.id, title = %document.title, documents = current.len(), "document added");
        Ok(document)
    }

    /// Remove a document by id and publish the new snapshot.
    ///
    /// Returns the removed document, or `None` when no document has that id.
    pub fn delete(&self, id: &str) -> Option<KnowledgeDocument> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let position = current.documents().iter().position(|d| d.id == id)?;

        let (mut documents, skipped) = current.as_ref().clone().into_parts();
        let removed = documents.remove(position);
        *current = Arc::new(Corpus::new(documents, skipped));

        info!(id, documents = current.len(), "document deleted");
        Some(removed)
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::new(Corpus::default())
    }
}
