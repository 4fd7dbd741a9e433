//! Export configuration.

use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the export pipeline and orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory that receives one subdirectory per export.
    pub export_root: PathBuf,
    /// Local directory backing `/textures/...` URLs.
    pub texture_root: PathBuf,
    /// Public URL prefix under which `export_root` is served.
    pub url_prefix: String,
    /// Maximum number of exports running at once.
    pub max_concurrent: usize,
    /// Seconds an artifact directory is kept after creation.
    pub artifact_ttl_secs: u64,
    /// Seconds a completed job stays queryable.
    pub completed_job_ttl_secs: u64,
    /// Seconds a failed job stays queryable.
    pub failed_job_ttl_secs: u64,
    /// Seconds between cleanup sweeps.
    pub sweep_interval_secs: u64,
    /// Directories without metadata are removed after this many seconds of inactivity.
    pub orphan_dir_ttl_secs: u64,
    /// Depth step between stacked floor layers.
    pub z_fight_epsilon: f64,
    pub compression: CompressionConfig,
    pub converter: ConverterConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_root: PathBuf::from("uploads/temp/exports"),
            texture_root: PathBuf::from("/shared/textures"),
            url_prefix: "/temp/exports".to_string(),
            max_concurrent: 2,
            artifact_ttl_secs: 3600,
            completed_job_ttl_secs: 3600,
            failed_job_ttl_secs: 1800,
            sweep_interval_secs: 1800,
            orphan_dir_ttl_secs: 7200,
            z_fight_epsilon: 0.001,
            compression: CompressionConfig::default(),
            converter: ConverterConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Load configuration from a TOML file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExportError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.with_env().validated()
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CONVERTER_URL") {
            if !url.is_empty() {
                self.converter.url = url;
            }
        }
        self
    }

    fn validated(self) -> Result<Self> {
        if self.max_concurrent == 0 {
            return Err(ExportError::Config("max_concurrent must be at least 1".into()));
        }
        if self.z_fight_epsilon.is_nan() || self.z_fight_epsilon <= 0.0 {
            return Err(ExportError::Config("z_fight_epsilon must be positive".into()));
        }
        Ok(self)
    }

    pub fn with_export_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.export_root = root.into();
        self
    }

    pub fn with_texture_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.texture_root = root.into();
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_converter(mut self, converter: ConverterConfig) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_z_fight_epsilon(mut self, epsilon: f64) -> Self {
        self.z_fight_epsilon = epsilon;
        self
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn completed_job_ttl(&self) -> Duration {
        Duration::from_secs(self.completed_job_ttl_secs)
    }

    pub fn failed_job_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn orphan_dir_ttl(&self) -> Duration {
        Duration::from_secs(self.orphan_dir_ttl_secs)
    }
}

/// How the finished GLB is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// In-process vertex quantization.
    Quantize,
    /// External command line tool.
    Command,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub mode: CompressionMode,
    /// Program and arguments; `{input}` and `{output}` are substituted.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Quantize,
            command: ["gltf-transform", "draco", "{input}", "{output}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 120,
        }
    }
}

impl CompressionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the secondary format conversion happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterMode {
    /// Remote conversion service.
    Http,
    /// In-process USDZ writer.
    Local,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub mode: ConverterMode,
    /// Base URL of the conversion service.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            mode: ConverterMode::Local,
            url: "http://converter:3001".to_string(),
            timeout_secs: 300,
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
