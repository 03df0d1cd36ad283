//! Configuration management for ragqa.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`<workspace>/.ragqa/config.yaml`)
//! - Environment variables (`RAGQA_*`, `OLLAMA_URL`)
//! - Command-line flags
//!
//! Checkpoint names, dataset names and saved model paths used by the
//! demo runs all live here, so nothing below the CLI hardcodes a path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".ragqa";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragqa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Compute device preference: "auto", "cpu" or "accelerator"
    pub device: String,

    /// Allow fetching missing tokenizer files from the Hugging Face Hub
    pub allow_downloads: bool,

    /// Data, index and checkpoint cache locations
    pub paths: PathsConfig,

    /// Generator backend settings
    pub generator: GeneratorSettings,

    /// Question encoder (embedding provider) settings
    pub question_encoder: EncoderSettings,

    /// Saved model locations used by `ragqa demo`
    pub demo: DemoSettings,
}

/// Filesystem locations. Relative paths resolve against the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    /// Root of passage datasets (`<data_dir>/<dataset>/<name>.<split>.jsonl`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of persisted passage indexes
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// Checkpoint cache (tokenizers downloaded or copied by name)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(STATE_DIR).join("data")
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(STATE_DIR).join("indexes")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(STATE_DIR).join("checkpoints")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Generator backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSettings {
    /// Backend: "ollama" or "extractive"
    pub provider: String,

    /// Backend endpoint (Ollama base URL)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model served by the backend
    pub model: String,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "llama3.2".to_string(),
            timeout: Some(60),
        }
    }
}

/// Question encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    /// Provider: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint (Ollama base URL)
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Locations of saved RAG models for the demo runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DemoSettings {
    /// Saved token-level model directory
    pub token_model_path: PathBuf,

    /// Saved sequence-level model directory
    pub sequence_model_path: PathBuf,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            token_model_path: PathBuf::from("models/rag-token-nq"),
            sequence_model_path: PathBuf::from("models/rag-sequence-nq"),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    device: Option<String>,
    allow_downloads: Option<bool>,
    paths: Option<PathsConfig>,
    generator: Option<GeneratorSettings>,
    question_encoder: Option<EncoderSettings>,
    demo: Option<DemoSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            device: "auto".to_string(),
            allow_downloads: true,
            paths: PathsConfig::default(),
            generator: GeneratorSettings::default(),
            question_encoder: EncoderSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration for a workspace.
    ///
    /// Environment variables:
    /// - `RAGQA_DEVICE`: Device preference
    /// - `RAGQA_GENERATOR`: Generator backend
    /// - `RAGQA_GENERATOR_MODEL`: Generator model
    /// - `OLLAMA_URL`: Endpoint for Ollama-backed components
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragqa_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None, None).expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }
        config.config_file = config_file;

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env();

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        if let Some(device) = file.device {
            self.device = device;
        }
        if let Some(allow) = file.allow_downloads {
            self.allow_downloads = allow;
        }
        if let Some(paths) = file.paths {
            self.paths = paths;
        }
        if let Some(generator) = file.generator {
            self.generator = generator;
        }
        if let Some(encoder) = file.question_encoder {
            self.question_encoder = encoder;
        }
        if let Some(demo) = file.demo {
            self.demo = demo;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(())
    }

    /// Environment variables override the config file.
    fn apply_env(&mut self) {
        if let Ok(device) = std::env::var("RAGQA_DEVICE") {
            self.device = device;
        }
        if let Ok(provider) = std::env::var("RAGQA_GENERATOR") {
            self.generator.provider = provider;
        }
        if let Ok(model) = std::env::var("RAGQA_GENERATOR_MODEL") {
            self.generator.model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.generator.endpoint.get_or_insert(url.clone());
            self.question_encoder.endpoint.get_or_insert(url);
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level.get_or_insert(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Apply CLI overrides to the configuration.
    pub fn with_overrides(
        mut self,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        device: Option<String>,
    ) -> Self {
        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if let Some(device) = device {
            self.device = device;
        }

        self
    }

    /// Get the path to the .ragqa directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Resolve a possibly relative path against the workspace.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Absolute dataset root.
    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.paths.data_dir)
    }

    /// Absolute index root.
    pub fn index_dir(&self) -> PathBuf {
        self.resolve(&self.paths.index_dir)
    }

    /// Absolute checkpoint cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.paths.cache_dir)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        let known_devices = ["auto", "cpu", "accelerator", "gpu", "cuda"];
        if !known_devices.contains(&self.device.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown device: {}. Supported: auto, cpu, accelerator",
                self.device
            )));
        }

        let known_generators = ["ollama", "extractive"];
        if !known_generators.contains(&self.generator.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown generator provider: {}. Supported: {}",
                self.generator.provider,
                known_generators.join(", ")
            )));
        }

        if self.question_encoder.dimensions == 0 {
            return Err(AppError::Config(
                "Question encoder dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
