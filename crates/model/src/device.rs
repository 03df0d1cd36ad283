//! Compute device selection.

use ragqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where generation runs.
///
/// Only backends that execute models honor the device; retrieval and
/// tokenization always run on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    Accelerator,
}

impl Device {
    /// Accelerator when one is visible, else CPU.
    ///
    /// `RAGQA_ACCELERATOR=1|0` overrides probing for `/dev/nvidia0`.
    pub fn detect() -> Self {
        let visible = match std::env::var("RAGQA_ACCELERATOR") {
            Ok(value) => matches!(value.trim(), "1" | "true" | "yes"),
            Err(_) => Path::new("/dev/nvidia0").exists(),
        };

        let device = if visible {
            Self::Accelerator
        } else {
            Self::Cpu
        };
        tracing::debug!("Detected device: {}", device);
        device
    }

    /// Resolve a configured preference ("auto", "cpu", "accelerator").
    pub fn from_preference(preference: &str) -> AppResult<Self> {
        match preference.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::detect()),
            "cpu" => Ok(Self::Cpu),
            "accelerator" | "gpu" | "cuda" => Ok(Self::Accelerator),
            other => Err(AppError::Config(format!(
                "Unknown device: {}. Supported: auto, cpu, accelerator",
                other
            ))),
        }
    }

    /// Accelerator layers a backend may offload; `Some(0)` pins to CPU.
    pub fn num_gpu(self) -> Option<u32> {
        match self {
            Self::Cpu => Some(0),
            Self::Accelerator => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Accelerator => "accelerator",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
