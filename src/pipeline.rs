//! One export, start to finish.
//!
//! ```text
//! fetch snapshot -> build scene -> merge models -> write GLB
//!     -> convert (optional, uncompressed input) -> compress -> publish
//! ```
//!
//! Everything is written into a private `tmp_*` staging directory that is
//! renamed to the export id only once every file is in place. A failed
//! export removes its staging directory.

use crate::builder::SceneBuilder;
use crate::compress::{compressor_from_config, GeometryCompressor};
use crate::config::ExportConfig;
use crate::convert::{converter_from_config, FormatConverter};
use crate::error::{ExportError, Result, Stage, StageExt};
use crate::export::write_glb;
use crate::merge::ModelMerger;
use crate::source::{ModelSource, SceneSource, TextureSource};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Metadata sidecar written next to every export.
pub const META_FILE: &str = ".meta.json";

/// Prefix of in-progress export directories.
pub const STAGING_PREFIX: &str = "tmp_";

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub input_key: String,
    /// Display name; defaults to the scene name.
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub want_secondary: bool,
    /// Owning job; names the staging directory so the sweeper can tell it
    /// is still in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl ExportRequest {
    pub fn new(input_key: impl Into<String>) -> Self {
        Self {
            input_key: input_key.into(),
            output_name: None,
            want_secondary: false,
            job_id: None,
        }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_secondary(mut self, want: bool) -> Self {
        self.want_secondary = want;
        self
    }

    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Name of the staging directory under the export root.
    pub fn staging_name(&self) -> String {
        match &self.job_id {
            Some(id) => format!("{}{}", STAGING_PREFIX, id),
            None => format!("{}{}", STAGING_PREFIX, short_id()),
        }
    }
}

/// A published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub file_name: String,
    pub path: PathBuf,
    pub url: String,
    pub size: u64,
    pub size_formatted: String,
}

/// Descriptor returned for a finished export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub export_id: String,
    pub scene_name: String,
    pub primary: ArtifactInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<ArtifactInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Contents of [`META_FILE`]. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub created_at: i64,
    pub expires_at: i64,
    pub input_key: String,
}

/// Runs exports with a fixed set of collaborators.
pub struct ExportPipeline {
    config: ExportConfig,
    scenes: Box<dyn SceneSource>,
    models: Box<dyn ModelSource>,
    textures: Box<dyn TextureSource>,
    compressor: Option<Box<dyn GeometryCompressor>>,
    converter: Option<Box<dyn FormatConverter>>,
}

impl ExportPipeline {
    /// Create a pipeline using the compressor and converter selected by `config`.
    pub fn new(
        config: ExportConfig,
        scenes: impl SceneSource + 'static,
        models: impl ModelSource + 'static,
        textures: impl TextureSource + 'static,
    ) -> Result<Self> {
        let compressor = compressor_from_config(&config.compression);
        let converter = converter_from_config(&config.converter)?;
        Ok(Self {
            config,
            scenes: Box::new(scenes),
            models: Box::new(models),
            textures: Box::new(textures),
            compressor,
            converter,
        })
    }

    pub fn with_compressor(mut self, compressor: Option<Box<dyn GeometryCompressor>>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_converter(mut self, converter: Option<Box<dyn FormatConverter>>) -> Self {
        self.converter = converter;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run one export. `progress` receives a percentage and a message at
    /// each checkpoint; percentages never decrease.
    pub fn run(&self, request: &ExportRequest, progress: &mut dyn FnMut(u8, &str)) -> Result<ExportResult> {
        let snapshot = self.scenes.fetch(&request.input_key).stage(Stage::Snapshot)?;
        progress(10, "scene loaded");

        let scene_name = request
            .output_name
            .clone()
            .or_else(|| snapshot.scene.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "scene".to_string());
        let safe_name = sanitize_name(&scene_name);

        let staging = self.config.export_root.join(request.staging_name());
        let export_id = format!("export_{}_{}", Utc::now().timestamp_millis(), short_id());
        let export_dir = self.config.export_root.join(&export_id);
        with_staging(&staging, |staging| {
            let mut warnings = Vec::new();

            let built = SceneBuilder::new(&snapshot, self.textures.as_ref())
                .with_z_fight_epsilon(self.config.z_fight_epsilon)
                .build()
                .stage(Stage::Build)?;
            warnings.extend(built.warnings);
            let mut doc = built.document;
            progress(20, "scene geometry built");

            let report = ModelMerger::new(self.models.as_ref()).merge_items(&mut doc, &snapshot, |done, total| {
                let percent = 20 + (50 * done / total.max(1)) as u8;
                progress(percent, &format!("placed model {}/{}", done, total));
            });
            warnings.extend(report.warnings);

            let glb_name = format!("{}.glb", safe_name);
            let glb_path = staging.join(&glb_name);
            let glb = write_glb(&doc).stage(Stage::Serialize)?;
            std::fs::write(&glb_path, &glb).stage(Stage::Serialize)?;
            tracing::info!(bytes = glb.len(), meshes = doc.meshes.len(), "GLB written");
            progress(75, "GLB written");

            let mut secondary = None;
            let mut secondary_error = None;
            if request.want_secondary {
                progress(80, "converting");
                match self.convert(staging, &glb_path, &safe_name) {
                    Ok(name) => secondary = Some(name),
                    Err(e) => {
                        tracing::warn!(error = %e, "secondary conversion failed");
                        secondary_error = Some(e.to_string());
                    }
                }
                progress(88, "conversion finished");
            }

            if let Some(compressor) = &self.compressor {
                progress(90, "compressing");
                if let Err(e) = compress_in_place(compressor.as_ref(), &glb_path) {
                    tracing::warn!(compressor = compressor.name(), error = %e, "compression failed, keeping uncompressed GLB");
                    warnings.push(format!("compression skipped: {}", e));
                }
                progress(95, "compression finished");
            }

            let now = Utc::now().timestamp_millis();
            let meta = ExportMeta {
                created_at: now,
                expires_at: now + self.config.artifact_ttl().as_millis() as i64,
                input_key: request.input_key.clone(),
            };
            std::fs::write(staging.join(META_FILE), serde_json::to_vec(&meta)?).stage(Stage::Publish)?;

            // Described at their published location, measured while staged.
            let primary = self.artifact(staging, &export_dir, &export_id, glb_name)?;
            let secondary = match secondary {
                Some(name) => Some(self.artifact(staging, &export_dir, &export_id, name)?),
                None => None,
            };
            Ok((primary, secondary, secondary_error, warnings))
        })
        .and_then(|(primary, secondary, secondary_error, warnings)| {
            if let Err(e) = std::fs::rename(&staging, &export_dir) {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(ExportError::from(e).in_stage(Stage::Publish));
            }
            tracing::info!(export_id = %export_id, size = primary.size, "export published");
            progress(100, "export complete");

            Ok(ExportResult {
                export_id,
                scene_name,
                primary,
                secondary,
                secondary_error,
                warnings,
            })
        })
    }

    fn convert(&self, staging: &Path, glb_path: &Path, safe_name: &str) -> Result<String> {
        let converter = self
            .converter
            .as_ref()
            .ok_or_else(|| ExportError::Conversion("no converter configured".to_string()))?;
        let name = format!("{}.{}", safe_name, converter.extension());
        converter.convert(glb_path, &staging.join(&name)).stage(Stage::Convert)?;
        Ok(name)
    }

    fn artifact(&self, staging: &Path, export_dir: &Path, export_id: &str, file_name: String) -> Result<ArtifactInfo> {
        let size = std::fs::metadata(staging.join(&file_name)).stage(Stage::Publish)?.len();
        let path = export_dir.join(&file_name);
        Ok(ArtifactInfo {
            url: format!("{}/{}/{}", self.config.url_prefix.trim_end_matches('/'), export_id, file_name),
            file_name,
            path,
            size,
            size_formatted: format_size(size),
        })
    }
}

/// Create `dir`, run `f` in it, and remove it again if `f` fails.
pub fn with_staging<T>(dir: &Path, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    std::fs::create_dir_all(dir).stage(Stage::Publish)?;
    let result = f(dir);
    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staging directory");
        }
    }
    result
}

/// Compress `path` into a sibling file and move it over the original.
fn compress_in_place(compressor: &dyn GeometryCompressor, path: &Path) -> Result<()> {
    let tmp = path.with_extension("compressed.glb");
    let result = compressor
        .compress(path, &tmp)
        .and_then(|_| std::fs::rename(&tmp, path).map_err(ExportError::from));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result.stage(Stage::Compress)
}

/// File-system safe lowercase name: anything outside `[a-z0-9_-]` becomes
/// `_`. An empty name becomes `scene`.
pub fn sanitize_name(name: &str) -> String {
    if name.is_empty() {
        return "scene".to_string();
    }
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.2} MB", b / MB)
    }
}
