//! Input collaborators.
//!
//! The pipeline never talks to the persistence layer or the key store
//! directly; it asks these traits. Filesystem implementations are provided
//! for the CLI and tests.

use crate::error::{ExportError, Result};
use crate::types::{ModelFile, SceneSnapshot};
use std::path::{Component, Path, PathBuf};

/// Resolves an input key to a full scene snapshot.
pub trait SceneSource: Send + Sync {
    fn fetch(&self, input_key: &str) -> Result<SceneSnapshot>;
}

/// Loads model container bytes.
pub trait ModelSource: Send + Sync {
    /// Returns `Ok(None)` when the file does not exist.
    fn load(&self, model: &ModelFile) -> Result<Option<Vec<u8>>>;
}

/// Decrypts a model file encrypted at rest.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, path: &Path, iv: &str, auth_tag: &str) -> Result<Vec<u8>>;
}

/// Encoded texture bytes.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Loads texture images by URL.
pub trait TextureSource: Send + Sync {
    /// Returns `None` when the texture cannot be found or read.
    fn load(&self, url: &str) -> Option<TextureData>;
}

/// Reads `{root}/{key}.json`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    root: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, input_key: &str) -> Result<PathBuf> {
        let key = Path::new(input_key);
        let plain = key.components().count() == 1
            && matches!(key.components().next(), Some(Component::Normal(_)));
        if input_key.is_empty() || !plain {
            return Err(ExportError::MissingResource(format!("invalid input key '{}'", input_key)));
        }
        Ok(self.root.join(format!("{}.json", input_key)))
    }
}

impl SceneSource for JsonSnapshotSource {
    fn fetch(&self, input_key: &str) -> Result<SceneSnapshot> {
        let path = self.path_for(input_key)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            ExportError::MissingResource(format!("scene '{}' ({}): {}", input_key, path.display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A decryptor for deployments without encrypted models.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryptor;

impl Decryptor for NoDecryptor {
    fn decrypt(&self, path: &Path, _iv: &str, _auth_tag: &str) -> Result<Vec<u8>> {
        Err(ExportError::ModelLoad(format!(
            "{} is encrypted and no decryptor is configured",
            path.display()
        )))
    }
}

/// Loads models from disk, decrypting when the record carries an IV and tag.
pub struct FsModelSource {
    root: PathBuf,
    decryptor: Box<dyn Decryptor>,
}

impl FsModelSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            decryptor: Box::new(NoDecryptor),
        }
    }

    pub fn with_decryptor(mut self, decryptor: impl Decryptor + 'static) -> Self {
        self.decryptor = Box::new(decryptor);
        self
    }

    /// Absolute paths are used as-is; relative ones resolve against the root.
    pub fn resolve(&self, model: &ModelFile) -> PathBuf {
        let path = Path::new(&model.file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ModelSource for FsModelSource {
    fn load(&self, model: &ModelFile) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(model);
        if !path.is_file() {
            return Ok(None);
        }
        match (&model.iv, &model.auth_tag) {
            (Some(iv), Some(tag)) => self.decryptor.decrypt(&path, iv, tag).map(Some),
            _ => Ok(Some(std::fs::read(&path)?)),
        }
    }
}

/// Loads textures from disk. `/textures/...` URLs map into the texture root.
#[derive(Debug, Clone)]
pub struct FsTextureSource {
    texture_root: PathBuf,
    base_dir: PathBuf,
}

impl FsTextureSource {
    pub fn new(texture_root: impl Into<PathBuf>) -> Self {
        Self {
            texture_root: texture_root.into(),
            base_dir: PathBuf::from("."),
        }
    }

    /// Directory relative URLs resolve against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn resolve(&self, url: &str) -> PathBuf {
        if let Some(rest) = url.strip_prefix("/textures/") {
            return self.texture_root.join(rest);
        }
        let path = Path::new(url);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl TextureSource for FsTextureSource {
    fn load(&self, url: &str) -> Option<TextureData> {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
            tracing::warn!(url, "remote texture URLs are not supported");
            return None;
        }
        let path = self.resolve(url);
        match std::fs::read(&path) {
            Ok(bytes) => Some(TextureData {
                mime_type: mime_for(&path).to_string(),
                bytes,
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "texture file not found");
                None
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct XorDecryptor;

    impl Decryptor for XorDecryptor {
        fn decrypt(&self, path: &Path, _iv: &str, _auth_tag: &str) -> Result<Vec<u8>> {
            Ok(std::fs::read(path)?.into_iter().map(|b| b ^ 0xff).collect())
        }
    }

    fn model(path: &str) -> ModelFile {
        ModelFile {
            file_name: None,
            file_path: path.to_string(),
            iv: None,
            auth_tag: None,
        }
    }

    #[test]
    fn test_snapshot_source_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scene-1.json"),
            r#"{"scene": {"name": "Patio", "floor": {"type": "rectangle", "width": 4, "depth": 3}}}"#,
        )
        .unwrap();
        let source = JsonSnapshotSource::new(dir.path());
        let snapshot = source.fetch("scene-1").unwrap();
        assert_eq!(snapshot.scene.name.as_deref(), Some("Patio"));
        assert!(matches!(source.fetch("missing"), Err(ExportError::MissingResource(_))));
    }

    #[test]
    fn test_snapshot_source_rejects_traversal() {
        let source = JsonSnapshotSource::new("/tmp");
        assert!(source.fetch("../etc/passwd").is_err());
        assert!(source.fetch("a/b").is_err());
        assert!(source.fetch("").is_err());
    }

    #[test]
    fn test_model_source_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsModelSource::new(dir.path());
        assert!(source.load(&model("nope.glb")).unwrap().is_none());
    }

    #[test]
    fn test_model_source_decrypts_when_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.glb"), [0x00u8, 0x0f]).unwrap();

        let mut encrypted = model("m.glb");
        encrypted.iv = Some("00".into());
        encrypted.auth_tag = Some("00".into());

        let plain = FsModelSource::new(dir.path());
        assert_eq!(plain.load(&model("m.glb")).unwrap().unwrap(), vec![0x00, 0x0f]);
        assert!(matches!(plain.load(&encrypted), Err(ExportError::ModelLoad(_))));

        let source = FsModelSource::new(dir.path()).with_decryptor(XorDecryptor);
        assert_eq!(source.load(&encrypted).unwrap().unwrap(), vec![0xff, 0xf0]);
    }

    #[test]
    fn test_texture_url_mapping() {
        let source = FsTextureSource::new("/shared/textures").with_base_dir("/srv");
        assert_eq!(
            source.resolve("/textures/pbr/wood/baseColor.jpg"),
            PathBuf::from("/shared/textures/pbr/wood/baseColor.jpg")
        );
        assert_eq!(source.resolve("/abs/a.png"), PathBuf::from("/abs/a.png"));
        assert_eq!(source.resolve("uploads/a.png"), PathBuf::from("/srv/uploads/a.png"));
    }

    #[test]
    fn test_texture_source_loads_with_mime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.JPG"), [1u8, 2, 3]).unwrap();
        let source = FsTextureSource::new(dir.path());
        let tex = source.load("/textures/a.JPG").unwrap();
        assert_eq!(tex.mime_type, "image/jpeg");
        assert_eq!(tex.bytes, vec![1, 2, 3]);
        assert!(source.load("/textures/missing.png").is_none());
    }
}
