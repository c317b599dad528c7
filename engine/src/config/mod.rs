//! Triad settings
//!
//! Read from `~/.triad/config.toml` (written with defaults on first run) or
//! from a path given on the command line.
//!
//! # Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Embedding provider, HTTP timeout and Gemini settings
//! - **memory**: Vector collection name, dimension, retrieval depth
//! - **server**: Bind address and admin token for the API server
//!
//! Every section and field has a default, so a partial file (or an empty
//! one) is valid.
//!
//! # Examples
//!
//! ```no_run
//! use triad_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Text model: {}", config.llm.gemini.text_model);
//! # Ok(())
//! # }
//! ```

use crate::llm::EmbeddingTask;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Whole config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Upstream model configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Vector memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// API server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[core]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// One of error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where `triad.db` lives; a leading `~` is expanded
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Upstream model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Embedding backend: "gemini" or "hashing" (offline)
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    /// HTTP timeout for upstream calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Gemini settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL for Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model used by all three stages
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Vector memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Vector length; must match what the embedding provider returns
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Memories retrieved for the worker prompt
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Task type used when embedding queries
    #[serde(default = "default_query_task_type")]
    pub query_task_type: EmbeddingTask,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bearer token for admin routes; admin routes are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.triad")
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_embedding_model() -> String {
    "gemini-embedding-001".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_collection() -> String {
    crate::memory::DEFAULT_COLLECTION.to_string()
}

fn default_dimension() -> usize {
    3072
}

fn default_top_k() -> usize {
    crate::pipeline::DEFAULT_TOP_K
}

fn default_query_task_type() -> EmbeddingTask {
    EmbeddingTask::RetrievalQuery
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            embedding_provider: default_embedding_provider(),
            request_timeout_secs: default_request_timeout(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            text_model: default_text_model(),
            embedding_model: default_embedding_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            dimension: default_dimension(),
            top_k: default_top_k(),
            query_task_type: default_query_task_type(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_token: None,
        }
    }
}

impl Config {
    /// Read `~/.triad/config.toml`, writing a default file there first if
    /// none exists.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Like [`Config::load_or_create`], for an explicit path
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Read an existing config file
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Malformed config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let defaults = Self::default();

        // Written before processing so the file keeps the portable ~ path
        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| EngineError::Config(format!("Cannot encode default config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Cannot write {}: {}", path.display(), e)))?;

        let mut config = defaults;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.triad/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        Ok(home_dir()?.join(".triad").join("config.toml"))
    }

    /// SQLite file holding tasks and vector memory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("triad.db")
    }

    /// Rejects out-of-range values, then expands and creates the data
    /// directory.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        one_of(
            "core.log_level",
            &self.core.log_level,
            &["error", "warn", "info", "debug", "trace"],
        )?;
        one_of(
            "llm.embedding_provider",
            &self.llm.embedding_provider,
            &["gemini", "hashing"],
        )?;

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !self.llm.gemini.base_url.starts_with("http://")
            && !self.llm.gemini.base_url.starts_with("https://")
        {
            return Err(EngineError::Config(format!(
                "Invalid Gemini base_url '{}'",
                self.llm.gemini.base_url
            )));
        }

        if self.memory.collection.trim().is_empty() {
            return Err(EngineError::Config(
                "memory.collection must not be empty".to_string(),
            ));
        }

        if self.memory.dimension == 0 {
            return Err(EngineError::Config(
                "memory.dimension must be greater than 0".to_string(),
            ));
        }

        if self.memory.top_k == 0 {
            return Err(EngineError::Config(
                "memory.top_k must be at least 1".to_string(),
            ));
        }

        self.server.bind_addr.parse::<SocketAddr>().map_err(|e| {
            EngineError::Config(format!(
                "Invalid server.bind_addr '{}': {}",
                self.server.bind_addr, e
            ))
        })?;

        if self
            .server
            .admin_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.server.admin_token = None;
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!(
                    "Cannot create {}: {}",
                    self.core.data_dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), EngineError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "{} = '{}' is not one of: {}",
            field,
            value,
            allowed.join(", ")
        )))
    }
}

fn home_dir() -> Result<PathBuf, EngineError> {
    dirs::home_dir().ok_or_else(|| EngineError::Config("No home directory".to_string()))
}

fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home_dir(),
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn toml_with_data_dir(dir: &TempDir, extra: &str) -> String {
        format!(
            "[core]\ndata_dir = {:?}\n{}",
            dir.path().join("data").to_str().unwrap(),
            extra
        )
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.embedding_provider, "gemini");
        assert_eq!(config.llm.request_timeout_secs, 60);
        assert_eq!(config.llm.gemini.text_model, "gemini-2.5-flash");
        assert_eq!(config.llm.gemini.embedding_model, "gemini-embedding-001");
        assert_eq!(config.memory.collection, "agent_memory");
        assert_eq!(config.memory.dimension, 3072);
        assert_eq!(config.memory.top_k, 3);
        assert_eq!(config.memory.query_task_type, EmbeddingTask::RetrievalQuery);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8000");
        assert!(config.server.admin_token.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&toml_with_data_dir(
            &dir,
            "[memory]\ntop_k = 5\nquery_task_type = \"retrieval_document\"\n",
        ))
        .unwrap();

        assert_eq!(config.memory.top_k, 5);
        assert_eq!(
            config.memory.query_task_type,
            EmbeddingTask::RetrievalDocument
        );
        assert_eq!(config.memory.dimension, 3072);
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_validation_errors() {
        let dir = TempDir::new().unwrap();
        for extra in [
            "log_level = \"loud\"\n",
            "[llm]\nembedding_provider = \"openai\"\n",
            "[llm]\nrequest_timeout_secs = 0\n",
            "[memory]\ntop_k = 0\n",
            "[memory]\ndimension = 0\n",
            "[memory]\nquery_task_type = \"clustering\"\n",
            "[server]\nbind_addr = \"not an address\"\n",
        ] {
            let result = Config::from_toml_str(&toml_with_data_dir(&dir, extra));
            assert!(
                matches!(result, Err(EngineError::Config(_))),
                "expected config error for {:?}",
                extra
            );
        }
    }

    #[test]
    fn test_blank_admin_token_disables_admin() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&toml_with_data_dir(
            &dir,
            "[server]\nadmin_token = \"  \"\n",
        ))
        .unwrap();
        assert!(config.server.admin_token.is_none());
    }

    #[test]
    fn test_load_or_create_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, toml_with_data_dir(&dir, "[llm]\nembedding_provider = \"hashing\"\n")).unwrap();

        let config = Config::load_or_create_at(&path).unwrap();
        assert_eq!(config.llm.embedding_provider, "hashing");
        assert_eq!(config.database_path(), dir.path().join("data").join("triad.db"));
    }

    #[test]
    fn test_default_file_keeps_portable_paths() {
        let written = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(written.contains("gemini-2.5-flash"));
        assert!(written.contains("~/.triad"));
        assert!(written.contains("retrieval_query"));
    }

    #[test]
    fn test_expand_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_path(&PathBuf::from("~/test")).unwrap(), home.join("test"));
        assert_eq!(expand_path(&PathBuf::from("~")).unwrap(), home);
        assert_eq!(
            expand_path(&PathBuf::from("/absolute/path")).unwrap(),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.memory.query_task_type, deserialized.memory.query_task_type);
    }
}
