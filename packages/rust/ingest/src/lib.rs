//! Ingestion pipeline: raw source blobs → normalized, recency-ordered corpus.
//!
//! - [`normalize`] turns one source (a single record or a fragment list) into
//!   documents, or a [`kbchat_shared::SkipRecord`] when it cannot be parsed.
//! - [`build_corpus`] runs the normalizer over every source and sorts the
//!   result newest-first.
//! - [`load_corpus`] does the same for a directory of `*.json` files.

mod corpus;
mod date_code;
mod normalizer;

pub use corpus::{Corpus, CorpusStats, build_corpus, load_corpus, load_sources};
pub use date_code::date_code_from_name;
pub use normalizer::{RawRecord, RawSource, normalize, normalize_record};
