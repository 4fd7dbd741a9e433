//! Secondary container conversion (GLB to USDZ).
//!
//! Conversion always consumes the uncompressed GLB. A failed conversion is
//! reported next to the primary artifact and never fails the export.

use crate::config::{ConverterConfig, ConverterMode};
use crate::error::{ExportError, Result};
use crate::export::export_usdz;
use crate::import::read_glb;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Converts a GLB file into another container format.
pub trait FormatConverter: Send + Sync {
    /// File extension of the produced container, without the dot.
    fn extension(&self) -> &str;

    fn convert(&self, glb: &Path, output: &Path) -> Result<()>;
}

/// Build the converter selected by `config`.
pub fn converter_from_config(config: &ConverterConfig) -> Result<Option<Box<dyn FormatConverter>>> {
    Ok(match config.mode {
        ConverterMode::Http => Some(Box::new(HttpConverter::new(&config.url, config.timeout())?)),
        ConverterMode::Local => Some(Box::new(UsdzConverter)),
        ConverterMode::None => None,
    })
}

/// In-process USDZ writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsdzConverter;

impl FormatConverter for UsdzConverter {
    fn extension(&self) -> &str {
        "usdz"
    }

    fn convert(&self, glb: &Path, output: &Path) -> Result<()> {
        let doc = read_glb(&std::fs::read(glb)?)?;
        let usdz = export_usdz(&doc)?;
        std::fs::write(output, usdz)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    id: String,
    name: String,
}

/// Client for the external conversion service.
///
/// The GLB is uploaded to `POST {url}/api/convert` as the multipart field
/// `file`; the service answers `{id, name}` and the result is fetched from
/// `GET {url}/api/download?id=..&name=..`.
///
/// The blocking client owns its own runtime, so it is built on the first
/// conversion, which always runs off the async executor.
pub struct HttpConverter {
    base_url: String,
    timeout: Duration,
    client: OnceLock<Client>,
}

impl HttpConverter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        reqwest::Url::parse(base_url).map_err(|e| ExportError::Config(format!("invalid converter url: {}", e)))?;
        Ok(Self {
            base_url: base_url.to_string(),
            timeout,
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder().timeout(self.timeout).build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl FormatConverter for HttpConverter {
    fn extension(&self) -> &str {
        "usdz"
    }

    fn convert(&self, glb: &Path, output: &Path) -> Result<()> {
        let stem = glb
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_string());
        let part = multipart::Part::bytes(std::fs::read(glb)?)
            .file_name(format!("{}.glb", stem))
            .mime_str("model/gltf-binary")?;
        let form = multipart::Form::new().part("file", part);

        let client = self.client()?;
        let response = client
            .post(format!("{}/api/convert", self.base_url))
            .multipart(form)
            .send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ExportError::Conversion(format!("converter returned {}: {}", status, body)));
        }
        let converted: ConvertResponse = response.json()?;
        tracing::debug!(id = %converted.id, name = %converted.name, "conversion finished");

        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/download", self.base_url),
            &[("id", converted.id.as_str()), ("name", converted.name.as_str())],
        )
        .map_err(|e| ExportError::Conversion(format!("invalid converter url: {}", e)))?;
        let response = client.get(url).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ExportError::Conversion(format!("download returned {}: {}", status, body)));
        }

        std::fs::write(output, response.bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Node, Scene};
    use crate::export::write_glb;
    use crate::mesher::{Mesh, Vertex};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    fn write_sample_glb(path: &Path) {
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]));
        let b = mesh.add_vertex(Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]));
        let c = mesh.add_vertex(Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]));
        mesh.add_triangle(a, b, c);

        let mut doc = Document::new();
        let m = doc.add_triangle_mesh("Tile", &mesh, None);
        let root = doc.add_node(Node::new("Tile").with_mesh(m));
        doc.add_scene(Scene {
            name: None,
            nodes: vec![root],
        });
        doc.default_scene = Some(0);
        std::fs::write(path, write_glb(&doc).unwrap()).unwrap();
    }

    /// Serve `responses` in order, one connection each, returning the
    /// request lines seen.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, std::thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(value) = lower.strip_prefix("content-length:") {
                        length = value.trim().parse().unwrap();
                    }
                }
                let mut body_in = vec![0; length];
                reader.read_exact(&mut body_in).unwrap();
                seen.push(request_line.trim().to_string());

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                )
                .unwrap();
            }
            seen
        });
        (url, handle)
    }

    #[test]
    fn test_usdz_converter_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let glb = dir.path().join("room.glb");
        let usdz = dir.path().join("room.usdz");
        write_sample_glb(&glb);

        UsdzConverter.convert(&glb, &usdz).unwrap();
        let bytes = std::fs::read(&usdz).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_http_converter_uploads_and_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let glb = dir.path().join("room.glb");
        let usdz = dir.path().join("room.usdz");
        write_sample_glb(&glb);

        let (url, server) = serve(vec![
            (200, r#"{"id":"42_abc","name":"room.usdz"}"#),
            (200, "USDZDATA"),
        ]);
        let converter = HttpConverter::new(&url, Duration::from_secs(10)).unwrap();
        converter.convert(&glb, &usdz).unwrap();

        assert_eq!(std::fs::read(&usdz).unwrap(), b"USDZDATA");
        let seen = server.join().unwrap();
        assert!(seen[0].starts_with("POST /api/convert"));
        assert!(seen[1].starts_with("GET /api/download?id=42_abc&name=room.usdz"));
    }

    #[test]
    fn test_http_converter_reports_service_error() {
        let dir = tempfile::tempdir().unwrap();
        let glb = dir.path().join("room.glb");
        write_sample_glb(&glb);

        let (url, server) = serve(vec![(500, "no converter")]);
        let converter = HttpConverter::new(&url, Duration::from_secs(10)).unwrap();
        let err = converter.convert(&glb, &dir.path().join("room.usdz")).unwrap_err();

        assert!(matches!(err, ExportError::Conversion(_)));
        assert!(err.to_string().contains("no converter"));
        server.join().unwrap();
    }

    #[test]
    fn test_converter_from_config() {
        let mut config = ConverterConfig::default();
        assert!(converter_from_config(&config).unwrap().is_some());
        config.mode = ConverterMode::None;
        assert!(converter_from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_converter_builds_inside_runtime() {
        let config = ConverterConfig {
            mode: ConverterMode::Http,
            ..ConverterConfig::default()
        };
        let converter = converter_from_config(&config).unwrap();
        assert_eq!(converter.map(|c| c.extension().to_string()), Some("usdz".to_string()));
    }

    #[test]
    fn test_http_converter_rejects_bad_url() {
        assert!(matches!(
            HttpConverter::new("not a url", Duration::from_secs(1)),
            Err(ExportError::Config(_))
        ));
    }
}
