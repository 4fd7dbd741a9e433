//! # Scene Export
//!
//! Rebuilds a parametric room layout (floor, painted floor layers,
//! perimeter rings and placed models) into a single GLB, with optional
//! USDZ conversion and geometry compression.
//!
//! ## Overview
//!
//! The crate is layered, each stage consuming the previous one:
//!
//! 1. [`geometry`]: polygon offset, corner fillets, vector path parsing and
//!    triangulation.
//! 2. [`builder`]: turns a [`SceneSnapshot`] into a [`Document`] holding the
//!    floor, floor layers and perimeter.
//! 3. [`merge`]: loads each placed model's GLB, applies its placement and
//!    material overrides and merges it into the scene.
//! 4. [`export`], [`compress`], [`convert`]: GLB/USDZ writers and the
//!    optional post-processing passes.
//! 5. [`pipeline`] and [`orchestrator`]: one export end to end, and the
//!    asynchronous job layer on top of it.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scene_export::{ExportConfig, ExportOrchestrator, ExportPipeline, ExportRequest};
//! use scene_export::source::{FsModelSource, FsTextureSource, JsonSnapshotSource};
//!
//! let config = ExportConfig::load("export.toml")?;
//! let pipeline = ExportPipeline::new(
//!     config.clone(),
//!     JsonSnapshotSource::new("snapshots"),
//!     FsModelSource::new("models"),
//!     FsTextureSource::new(&config.texture_root),
//! )?;
//! let orchestrator = ExportOrchestrator::new(pipeline);
//!
//! let job_id = orchestrator.enqueue(ExportRequest::new("living-room")).await?;
//! let job = orchestrator.status(&job_id).await?;
//! ```
//!
//! ## Library Integration
//!
//! Scene records, model files and textures are reached only through the
//! traits in [`source`]. Implement [`SceneSource`] against your own storage
//! and hand it to [`ExportPipeline::new`].

pub mod builder;
pub mod compress;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod import;
pub mod merge;
pub mod mesher;
pub mod orchestrator;
pub mod pipeline;
pub mod source;
pub mod types;

// Re-export main types for convenience
pub use builder::{BuiltScene, SceneBuilder};
pub use compress::{CommandCompressor, GeometryCompressor, Quantizer};
pub use config::ExportConfig;
pub use convert::{FormatConverter, HttpConverter, UsdzConverter};
pub use document::Document;
pub use error::{ExportError, Result, Stage};
pub use export::{export_usdz, write_glb};
pub use import::read_glb;
pub use merge::{MergeReport, ModelMerger};
pub use orchestrator::{ExportJob, ExportOrchestrator, JobStatus, JobStore, MemoryJobStore};
pub use pipeline::{ArtifactInfo, ExportPipeline, ExportRequest, ExportResult};
pub use source::{Decryptor, ModelSource, SceneSource, TextureSource};
pub use types::{SceneDescription, SceneSnapshot};
