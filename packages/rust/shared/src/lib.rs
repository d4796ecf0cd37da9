//! Shared types, error model, and configuration for kbchat.
//!
//! This crate is the foundation depended on by all other kbchat crates.
//! It provides:
//! - [`KbChatError`], the unified error type
//! - Domain types ([`KnowledgeDocument`], [`SkipRecord`], [`ChatTurn`])
//! - Configuration ([`AppConfig`], [`RankingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, GenerationConfig, RankingConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key, validate_config,
};
pub use error::{KbChatError, Result};
pub use types::{
    ChatTurn, IngestMode, KnowledgeDocument, Role, SkipRecord, SynonymGroup, TYPE_BLOG,
    TYPE_YOUTUBE, format_date_code,
};
