//! Application configuration for kbchat.
//!
//! User config lives at `~/.kbchat/kbchat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbChatError, Result};
use crate::types::{IngestMode, SynonymGroup};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbchat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbchat";

// ---------------------------------------------------------------------------
// Config structs (matching kbchat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Corpus intake settings.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Relevance ranking settings.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// `[corpus]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding the `*.json` source files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Fragment handling: `merged` or `per-fragment`.
    #[serde(default)]
    pub ingest_mode: IngestMode,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest_mode: IngestMode::default(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}

/// `[ranking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Maximum number of documents returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Score added when a query token occurs in title or content.
    #[serde(default = "default_match_weight")]
    pub match_weight: u32,

    /// Extra score when the token occurs in the title alone.
    #[serde(default)]
    pub title_weight: u32,

    /// Score added when a synonym group fires.
    #[serde(default = "default_synonym_weight")]
    pub synonym_weight: u32,

    /// Replacement synonym table; empty means the built-in table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<SynonymGroup>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            match_weight: default_match_weight(),
            title_weight: 0,
            synonym_weight: default_synonym_weight(),
            synonyms: Vec::new(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_match_weight() -> u32 {
    2
}
fn default_synonym_weight() -> u32 {
    1
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for answers.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// API base URL (overridable for proxies and tests).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whether to enable the web search grounding tool.
    #[serde(default = "default_true")]
    pub web_search: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional file replacing the built-in instruction template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            web_search: true,
            timeout_secs: default_timeout_secs(),
            template_path: None,
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbchat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KbChatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbchat/kbchat.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbChatError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        KbChatError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbChatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbChatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbChatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the ranker or client cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.ranking.top_k == 0 {
        return Err(KbChatError::config("ranking.top_k must be at least 1"));
    }
    if config.ranking.match_weight == 0 {
        return Err(KbChatError::config("ranking.match_weight must be positive"));
    }
    for group in &config.ranking.synonyms {
        if group.triggers.is_empty() || group.markers.is_empty() {
            return Err(KbChatError::config(format!(
                "synonym group '{}' needs at least one trigger and one marker",
                group.name
            )));
        }
    }
    Ok(())
}

/// Check that the generation API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.generation.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(()),
        _ => Err(KbChatError::MissingCredentials {
            env_var: var_name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("ingest_mode = \"merged\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ranking.top_k, 3);
        assert_eq!(parsed.ranking.match_weight, 2);
        assert_eq!(parsed.ranking.title_weight, 0);
        assert_eq!(parsed.generation.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_config_with_synonyms_and_mode() {
        let toml_str = r#"
[corpus]
data_dir = "/srv/kb"
ingest_mode = "per-fragment"

[ranking]
top_k = 4
title_weight = 1

[[ranking.synonyms]]
name = "schedule"
triggers = ["시간", "스케줄"]
markers = ["출발", "도착"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.corpus.ingest_mode, IngestMode::PerFragment);
        assert_eq!(config.ranking.top_k, 4);
        assert_eq!(config.ranking.synonym_weight, 1);
        assert_eq!(config.ranking.synonyms.len(), 1);
        assert_eq!(config.ranking.synonyms[0].markers, vec!["출발", "도착"]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let mut config = AppConfig::default();
        config.ranking.top_k = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.generation.api_key_env = "KBCHAT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.unwrap_err().is_missing_credentials());
    }
}
