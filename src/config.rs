//! Configuration System
//!
//! Layered configuration for storage locations, fan-out behavior, retrieval tuning, and the
//! HTTP-backed collaborators. Sources are merged with the `config` crate: built-in defaults,
//! global file, workspace files, then `LESSONFORGE__*` environment variables.

use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub fanout: FanOutConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage locations. Unset paths are derived from `data_dir`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub uploads_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Sled database holding workflow states and progress events
    pub fn state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("state"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.uploads_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("uploaded-documents"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("indexes"))
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "lessonforge")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".lessonforge"))
}

/// Content fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Per-task timeout in seconds; unset waits indefinitely
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    /// Documents retrieved per submodule on retrieval-backed generation
    #[serde(default = "default_top_k_docs")]
    pub top_k_docs: usize,
}

fn default_top_k_docs() -> usize {
    7
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: None,
            top_k_docs: default_top_k_docs(),
        }
    }
}

impl FanOutConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

/// Retrieval index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_image_similarity_threshold")]
    pub image_similarity_threshold: f32,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_image_similarity_threshold() -> f32 {
    0.1
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            image_similarity_threshold: default_image_similarity_threshold(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    #[serde(default = "default_provider_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_provider_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            model: default_provider_model(),
            api_key_env: default_provider_api_key_env(),
            temperature: None,
        }
    }
}

/// Serper-compatible web and image search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    /// Organic results requested per query
    #[serde(default = "default_search_results")]
    pub results: usize,
}

fn default_search_base_url() -> String {
    "https://google.serper.dev".to_string()
}

fn default_search_api_key_env() -> String {
    "SERPER_API_KEY".to_string()
}

fn default_search_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_api_key_env(),
            results: default_search_results(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Storage(String),
    FanOut(String),
    Rag(String),
    Provider(String),
    Search(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::FanOut(msg) => write!(f, "Fan-out: {}", msg),
            ValidationError::Rag(msg) => write!(f, "Retrieval: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Search(msg) => write!(f, "Search: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ForgeConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (name, path) in [
            ("data_dir", &self.storage.data_dir),
            ("state_path", &self.storage.state_path),
            ("uploads_path", &self.storage.uploads_path),
            ("index_path", &self.storage.index_path),
        ] {
            if matches!(path, Some(p) if p.as_os_str().is_empty()) {
                errors.push(ValidationError::Storage(format!("{} cannot be empty", name)));
            }
        }

        if self.fanout.top_k_docs == 0 {
            errors.push(ValidationError::FanOut(
                "top_k_docs must be at least 1".to_string(),
            ));
        }
        if self.fanout.task_timeout_secs == Some(0) {
            errors.push(ValidationError::FanOut(
                "task_timeout_secs must be positive when set".to_string(),
            ));
        }

        if self.rag.chunk_size == 0 {
            errors.push(ValidationError::Rag("chunk_size must be positive".to_string()));
        } else if self.rag.chunk_overlap >= self.rag.chunk_size {
            errors.push(ValidationError::Rag(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.rag.image_similarity_threshold) {
            errors.push(ValidationError::Rag(
                "image_similarity_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.provider.model.trim().is_empty() {
            errors.push(ValidationError::Provider("model cannot be empty".to_string()));
        }
        if url::Url::parse(&self.provider.base_url).is_err() {
            errors.push(ValidationError::Provider(format!(
                "invalid base_url '{}'",
                self.provider.base_url
            )));
        }
        if url::Url::parse(&self.search.base_url).is_err() {
            errors.push(ValidationError::Search(format!(
                "invalid base_url '{}'",
                self.search.base_url
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`ForgeConfig`] from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, global file, workspace files under `workspace_root/config`, then env.
    pub fn load(workspace_root: &Path) -> Result<ForgeConfig, PipelineError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = merge::merge_policy::with_environment(builder);
        Self::finish(builder.build()?)
    }

    /// Load defaults plus a single explicit file, then env.
    pub fn load_from_file(path: &Path) -> Result<ForgeConfig, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()));
        let builder = merge::merge_policy::with_environment(builder);
        Self::finish(builder.build()?)
    }

    fn finish(raw: Config) -> Result<ForgeConfig, PipelineError> {
        let config: ForgeConfig = raw.try_deserialize()?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::Config(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
