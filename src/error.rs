//! Error types for the scene export pipeline.

use std::fmt;
use thiserror::Error;

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Snapshot,
    Build,
    Merge,
    Serialize,
    Compress,
    Convert,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Snapshot => "snapshot",
            Stage::Build => "build",
            Stage::Merge => "merge",
            Stage::Serialize => "serialize",
            Stage::Compress => "compress",
            Stage::Convert => "convert",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Main error type for scene export operations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Failed to read or write a ZIP archive.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Failed to parse or write JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to decode or encode an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a TOML configuration file.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP failure talking to the conversion service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration is present but unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A binary container could not be parsed.
    #[error("Invalid glTF container: {0}")]
    InvalidContainer(String),

    /// Geometry only exists in a compressed form that is not decoded.
    #[error("Compressed geometry: {0}")]
    CompressedGeometry(String),

    /// A scene item's model could not be loaded.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// A referenced file or record does not exist.
    #[error("Resource not found: {0}")]
    MissingResource(String),

    /// Geometry compression failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Secondary format conversion failed.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Failed to assemble or write an export.
    #[error("Export error: {0}")]
    Export(String),

    /// Job lookup or bookkeeping failure.
    #[error("Job error: {0}")]
    Job(String),

    /// An error raised inside a specific pipeline stage.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    /// Attribute this error to a pipeline stage. Already attributed errors keep their stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            ExportError::Stage { .. } => self,
            other => ExportError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ExportError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Extension for attaching a stage to any `Result`.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<ExportError>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.into().in_stage(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution_is_sticky() {
        let err = ExportError::Export("boom".into()).in_stage(Stage::Serialize);
        assert_eq!(err.stage(), Some(Stage::Serialize));
        let err = err.in_stage(Stage::Build);
        assert_eq!(err.stage(), Some(Stage::Serialize));
        assert_eq!(err.to_string(), "serialize stage failed: Export error: boom");
    }

    #[test]
    fn test_stage_ext_on_io_result() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.stage(Stage::Publish).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Publish));
    }
}
