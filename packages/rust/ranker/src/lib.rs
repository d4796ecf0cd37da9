//! Lexical relevance ranking over the knowledge corpus.
//!
//! Scoring is a substring match per query token plus optional title and
//! synonym bonuses. Results are ordered by score, then by recency, and capped
//! at `top_k`. Ranking never fails: no match is an empty result.

mod synonyms;

use tracing::{debug, instrument};

use kbchat_shared::{KnowledgeDocument, RankingConfig};

pub use synonyms::SynonymTable;

/// A document paired with its relevance score during ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredCandidate<'a> {
    pub document: &'a KnowledgeDocument,
    pub score: u32,
}

/// Split a query into lowercased tokens, dropping single-character tokens.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1)
        .collect()
}

/// Scores and orders documents for a query.
#[derive(Debug, Clone)]
pub struct Ranker {
    top_k: usize,
    match_weight: u32,
    title_weight: u32,
    synonym_weight: u32,
    synonyms: SynonymTable,
}

impl Ranker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            top_k: config.top_k,
            match_weight: config.match_weight,
            title_weight: config.title_weight,
            synonym_weight: config.synonym_weight,
            synonyms: SynonymTable::from_config(&config.synonyms),
        }
    }

    /// Replace the synonym table.
    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score one document against already-tokenized query terms.
    ///
    /// Scores saturate at `u32::MAX` instead of overflowing.
    pub fn score(&self, tokens: &[String], document: &KnowledgeDocument) -> u32 {
        let title = document.title.to_lowercase();
        let haystack = format!("{} {}", title, document.content.to_lowercase());

        tokens.iter().fold(0u32, |score, token| {
            let mut gained = 0u32;
            if haystack.contains(token.as_str()) {
                gained = gained.saturating_add(self.match_weight);
            }
            if self.title_weight > 0 && title.contains(token.as_str()) {
                gained = gained.saturating_add(self.title_weight);
            }
            gained = gained.saturating_add(self.synonyms.bonus(token, &haystack, self.synonym_weight));
            score.saturating_add(gained)
        })
    }

    /// Rank documents and keep their scores.
    ///
    /// Documents scoring zero are dropped. Equal scores are ordered newest
    /// first; remaining ties keep corpus order.
    #[instrument(skip_all, fields(query = %query, corpus = documents.len()))]
    pub fn rank_scored<'a>(
        &self,
        query: &str,
        documents: &'a [KnowledgeDocument],
    ) -> Vec<ScoredCandidate<'a>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            debug!("query has no usable tokens");
            return Vec::new();
        }

        let mut candidates: Vec<ScoredCandidate<'a>> = documents
            .iter()
            .map(|document| ScoredCandidate {
                document,
                score: self.score(&tokens, document),
            })
            .filter(|c| c.score > 0)
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.document.date_code.cmp(&a.document.date_code))
        });
        candidates.truncate(self.top_k);

        for c in &candidates {
            debug!(id = %c.document.id, score = c.score, date_code = c.document.date_code, "ranked");
        }

        candidates
    }

    /// Top-K documents for a query, most relevant first.
    pub fn rank<'a>(
        &self,
        query: &str,
        documents: &'a [KnowledgeDocument],
    ) -> Vec<&'a KnowledgeDocument> {
        self.rank_scored(query, documents)
            .into_iter()
            .map(|c| c.document)
            .collect()
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(&RankingConfig::default())
    }
}
