//! Geometry compression of finished GLB files.
//!
//! Compression is the last step before publishing and is never fatal: the
//! pipeline keeps the uncompressed file when a compressor fails.

use crate::config::{CompressionConfig, CompressionMode};
use crate::document::{Accessor, AccessorData, AccessorType, Attribute, Document, Node};
use crate::error::{ExportError, Result};
use crate::export::write_glb;
use crate::import::read_glb;
use crate::types::BoundingBox;
use glam::Vec3;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const QUANTIZATION_EXTENSION: &str = "KHR_mesh_quantization";

/// Rewrites a GLB file into a smaller one.
pub trait GeometryCompressor: Send + Sync {
    fn name(&self) -> &str;

    /// Read `input` and write the compressed container to `output`.
    fn compress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Build the compressor selected by `config`.
pub fn compressor_from_config(config: &CompressionConfig) -> Option<Box<dyn GeometryCompressor>> {
    match config.mode {
        CompressionMode::Quantize => Some(Box::new(Quantizer)),
        CompressionMode::Command => Some(Box::new(CommandCompressor::new(
            config.command.clone(),
            config.timeout(),
        ))),
        CompressionMode::None => None,
    }
}

/// In-process vertex quantization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantizer;

impl GeometryCompressor for Quantizer {
    fn name(&self) -> &str {
        "quantize"
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let mut doc = read_glb(&bytes)?;
        let meshes = quantize_document(&mut doc);
        let glb = write_glb(&doc)?;
        std::fs::write(output, &glb)?;
        tracing::debug!(meshes, before = bytes.len(), after = glb.len(), "quantized geometry");
        Ok(())
    }
}

/// Quantize vertex attributes of every mesh used by a node.
///
/// Positions are stored as normalized i16 relative to the mesh's bounding
/// cube; a child node carrying the cube's centre and half-size restores the
/// original placement. Returns the number of meshes rewritten.
pub fn quantize_document(doc: &mut Document) -> usize {
    let users = doc.mesh_users();
    let mut placements: Vec<Option<(Vec3, f32)>> = vec![None; doc.meshes.len()];

    for (m, placement) in placements.iter_mut().enumerate() {
        if users[m] == 0 {
            continue;
        }
        let Some(bounds) = mesh_bounds(doc, m) else {
            continue;
        };
        let center = Vec3::from(bounds.center());
        let half = Vec3::from(bounds.dimensions()).max_element() * 0.5;
        let half = if half > f32::EPSILON { half } else { 1.0 };

        for p in 0..doc.meshes[m].primitives.len() {
            let attributes: Vec<(Attribute, usize)> = doc.meshes[m].primitives[p]
                .attributes
                .iter()
                .map(|(a, i)| (*a, *i))
                .collect();
            for (attribute, index) in attributes {
                let source = &doc.accessors[index];
                let quantized = match attribute {
                    Attribute::Position => Some(quantize_positions(source, center, half)),
                    Attribute::Normal => Some(quantize_normals(source)),
                    Attribute::TexCoord(_) | Attribute::Color(_) => quantize_unit(source),
                    Attribute::Tangent => None,
                };
                if let Some(accessor) = quantized {
                    let new_index = doc.add_accessor(accessor);
                    doc.meshes[m].primitives[p].attributes.insert(attribute, new_index);
                }
            }
        }
        *placement = Some((center, half));
    }

    for node_index in 0..doc.nodes.len() {
        let Some(mesh) = doc.nodes[node_index].mesh else {
            continue;
        };
        let Some((center, half)) = placements[mesh] else {
            continue;
        };
        let name = doc.nodes[node_index]
            .name
            .clone()
            .unwrap_or_else(|| format!("node_{}", node_index));
        doc.nodes[node_index].mesh = None;
        doc.add_child(
            node_index,
            Node::new(format!("{}_dequantize", name))
                .with_mesh(mesh)
                .with_translation(center)
                .with_scale(Vec3::splat(half)),
        );
    }

    let count = placements.iter().filter(|p| p.is_some()).count();
    if count > 0 {
        doc.extensions_used.insert(QUANTIZATION_EXTENSION.to_string());
        doc.extensions_required.insert(QUANTIZATION_EXTENSION.to_string());
    }
    count
}

fn mesh_bounds(doc: &Document, mesh: usize) -> Option<BoundingBox> {
    let points: Vec<[f32; 3]> = doc.meshes[mesh]
        .primitives
        .iter()
        .filter_map(|p| p.attributes.get(&Attribute::Position))
        .flat_map(|&i| {
            let accessor = &doc.accessors[i];
            (0..accessor.count()).map(move |e| {
                let v = accessor.element_f32(e);
                [v[0], v[1], v[2]]
            })
        })
        .collect();
    BoundingBox::from_points(points.into_iter())
}

fn quantize_positions(source: &Accessor, center: Vec3, half: f32) -> Accessor {
    let values = source.to_f32();
    let data = values
        .chunks_exact(3)
        .flat_map(|p| {
            let local = (Vec3::new(p[0], p[1], p[2]) - center) / half;
            local.to_array().map(snorm16)
        })
        .collect();
    normalized(AccessorData::I16(data), AccessorType::Vec3)
}

fn quantize_normals(source: &Accessor) -> Accessor {
    let data = source
        .to_f32()
        .into_iter()
        .map(|c| (c.clamp(-1.0, 1.0) * 127.0).round() as i8)
        .collect();
    normalized(AccessorData::I8(data), AccessorType::Vec3)
}

/// Texture coordinates and colours quantize to u16 only when every value
/// already lies in `[0, 1]`.
fn quantize_unit(source: &Accessor) -> Option<Accessor> {
    let values = source.to_f32();
    if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return None;
    }
    let data = values.into_iter().map(|v| (v * 65535.0).round() as u16).collect();
    Some(normalized(AccessorData::U16(data), source.kind))
}

fn snorm16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn normalized(data: AccessorData, kind: AccessorType) -> Accessor {
    Accessor {
        data,
        kind,
        normalized: true,
    }
}

/// Runs an external command such as `gltf-transform draco {input} {output}`.
#[derive(Debug, Clone)]
pub struct CommandCompressor {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandCompressor {
    /// `command` is the program followed by its arguments; `{input}` and
    /// `{output}` are replaced with the file paths.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl GeometryCompressor for CommandCompressor {
    fn name(&self) -> &str {
        "command"
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let input = input.to_string_lossy();
        let output_str = output.to_string_lossy();
        let mut args = self
            .command
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output_str));
        let program = args
            .next()
            .ok_or_else(|| ExportError::Compression("no compression command configured".into()))?;

        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExportError::Compression(format!("failed to start {}: {}", program, e)))?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExportError::Compression(format!(
                    "{} timed out after {:?}",
                    program, self.timeout
                )));
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        if !status.success() {
            return Err(ExportError::Compression(format!("{} exited with {}", program, status)));
        }
        if !output.is_file() {
            return Err(ExportError::Compression(format!("{} produced no output", program)));
        }
        Ok(())
    }
}
