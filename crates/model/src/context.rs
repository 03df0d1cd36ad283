//! Filesystem and device context shared by model assembly.

use crate::checkpoint::CheckpointResolver;
use crate::device::Device;
use ragqa_core::{AppConfig, AppResult};
use std::path::PathBuf;

/// Where models find datasets, indexes, checkpoints and prompt overrides.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub cache_dir: PathBuf,

    /// Directory holding `prompts/<id>.yml` overrides
    pub prompt_dir: PathBuf,

    pub allow_downloads: bool,
    pub device: Device,
}

impl ModelContext {
    pub fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            data_dir: config.data_dir(),
            index_dir: config.index_dir(),
            cache_dir: config.cache_dir(),
            prompt_dir: config.state_dir(),
            allow_downloads: config.allow_downloads,
            device: Device::from_preference(&config.device)?,
        })
    }

    pub fn resolver(&self) -> AppResult<CheckpointResolver> {
        CheckpointResolver::new(self.cache_dir.clone(), self.allow_downloads)
    }
}
