//! Configuration management for the pantry gateway
//!
//! Configuration comes from an optional TOML file
//! (`~/.config/pantry/config.toml`) overlaid by `PANTRY_*` environment
//! variables. All file fields are optional; the file is a partial overlay
//! on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Default LLM model for command extraction
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default embedding model for item resolution
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Which command extractor implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    /// LLM-backed when an API key is configured, rules otherwise
    #[default]
    Auto,
    /// Always the LLM-backed extractor
    Llm,
    /// Always the rule-based extractor
    Rules,
}

impl ExtractorMode {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "llm" => Ok(Self::Llm),
            "rules" => Ok(Self::Rules),
            other => Err(Error::Config(format!("unknown extractor mode: {other}"))),
        }
    }
}

/// Pantry gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, cache)
    pub data_dir: PathBuf,

    /// HTTP API server port
    pub port: u16,

    /// API keys for external services
    pub api_keys: ApiKeys,

    /// LLM extraction configuration
    pub llm: LlmConfig,

    /// Embedding model identifier
    pub embed_model: String,

    /// Command extractor selection
    pub extractor: ExtractorMode,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (extraction + embeddings)
    pub openai: Option<String>,
}

/// LLM extraction configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat-completions base URL (OpenAI-compatible)
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Maximum completion tokens per extraction call
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: 512,
        }
    }
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerFileConfig,

    #[serde(default)]
    llm: LlmFileConfig,

    #[serde(default)]
    api_keys: ApiKeysFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
struct ServerFileConfig {
    port: Option<u16>,
    data_dir: Option<PathBuf>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
struct LlmFileConfig {
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    embed_model: Option<String>,
    extractor: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
struct ApiKeysFileConfig {
    openai: Option<String>,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file is malformed or the data directory
    /// cannot be created
    pub fn load(port_override: Option<u16>) -> Result<Self> {
        let file = load_config_file()?;
        Self::from_parts(file, port_override)
    }

    fn from_parts(file: ConfigFile, port_override: Option<u16>) -> Result<Self> {
        let data_dir = std::env::var("PANTRY_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .or(file.server.data_dir)
            .or_else(default_data_dir)
            .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?;

        std::fs::create_dir_all(&data_dir)?;

        let port = port_override
            .or_else(|| {
                std::env::var("PANTRY_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
            })
            .or(file.server.port)
            .unwrap_or(18790);

        let openai = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or(file.api_keys.openai);

        let defaults = LlmConfig::default();
        let llm = LlmConfig {
            base_url: std::env::var("PANTRY_LLM_BASE_URL")
                .ok()
                .or(file.llm.base_url)
                .unwrap_or(defaults.base_url),
            model: std::env::var("PANTRY_LLM_MODEL")
                .ok()
                .or(file.llm.model)
                .unwrap_or(defaults.model),
            max_tokens: file.llm.max_tokens.unwrap_or(defaults.max_tokens),
        };

        let embed_model = file
            .llm
            .embed_model
            .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string());

        let extractor = match std::env::var("PANTRY_EXTRACTOR").ok().or(file.llm.extractor) {
            Some(mode) => ExtractorMode::parse(&mode)?,
            None => ExtractorMode::default(),
        };

        Ok(Self {
            data_dir,
            port,
            api_keys: ApiKeys { openai },
            llm,
            embed_model,
            extractor,
        })
    }

    /// Path to the gateway database file
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("pantry.db")
    }
}

/// Read and parse the optional config file
fn load_config_file() -> Result<ConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let raw = std::fs::read_to_string(&path)?;
    let parsed = toml::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(parsed)
}

/// `~/.config/pantry/config.toml`, or the platform equivalent
fn config_file_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PANTRY_CONFIG") {
        return Some(PathBuf::from(p));
    }
    directories::ProjectDirs::from("dev", "omni", "pantry")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform data directory (`~/.local/share/pantry` on Linux)
fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "pantry")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fields_are_all_optional() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert!(parsed.server.port.is_none());
        assert!(parsed.api_keys.openai.is_none());
    }

    #[test]
    fn file_overlay_parses() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 9999

            [llm]
            model = "gpt-4o"
            extractor = "rules"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.port, Some(9999));
        assert_eq!(parsed.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(parsed.llm.extractor.as_deref(), Some("rules"));
    }

    #[test]
    fn extractor_mode_parses() {
        assert_eq!(ExtractorMode::parse("auto").unwrap(), ExtractorMode::Auto);
        assert_eq!(ExtractorMode::parse("rules").unwrap(), ExtractorMode::Rules);
        assert!(ExtractorMode::parse("psychic").is_err());
    }
}
