//! GLB import.
//!
//! Reads a binary glTF container into a standalone [`Document`]. Vertex data
//! is decoded to f32 (normalized integers are dequantized) and indices to
//! u32, so the writer can re-encode everything uniformly. Animations, skins,
//! cameras and morph targets are dropped.

use crate::document::{
    components, Accessor, AccessorData, Attribute, Document, Image, Material, Mesh,
    Node, Primitive, Sampler, Scene, Texture, TextureRef, WrappingMode,
};
use crate::error::{ExportError, Result};
use glam::{Mat4, Quat, Vec3};
use gltf_json as json;
use json::validation::Checked;
use std::collections::{BTreeMap, HashSet};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F534A;
const CHUNK_BIN: u32 = 0x004E4942;

/// Geometry compression extensions stripped on import.
pub const COMPRESSION_EXTENSIONS: &[&str] = &["KHR_draco_mesh_compression", "EXT_meshopt_compression"];

/// Extensions accepted on import. Their payloads are decoded or dropped, so
/// their names are not carried into the document.
const DECODED_EXTENSIONS: &[&str] = &[
    "KHR_draco_mesh_compression",
    "EXT_meshopt_compression",
    "KHR_mesh_quantization",
    "KHR_materials_emissive_strength",
    "KHR_materials_specular",
    "KHR_materials_ior",
    "KHR_texture_transform",
];

fn invalid(message: impl Into<String>) -> ExportError {
    ExportError::InvalidContainer(message.into())
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| invalid("truncated header"))
}

/// Split a GLB into its JSON and optional BIN chunk.
pub fn split_glb(bytes: &[u8]) -> Result<(&[u8], Option<&[u8]>)> {
    if bytes.len() < 20 || &bytes[0..4] != GLB_MAGIC {
        return Err(invalid("missing glTF magic"));
    }
    let version = read_u32(bytes, 4)?;
    if version != 2 {
        return Err(invalid(format!("unsupported container version {}", version)));
    }
    let length = (read_u32(bytes, 8)? as usize).min(bytes.len());

    let mut offset = 12;
    let mut json_chunk = None;
    let mut bin_chunk = None;
    while offset + 8 <= length {
        let chunk_len = read_u32(bytes, offset)? as usize;
        let chunk_type = read_u32(bytes, offset + 4)?;
        let start = offset + 8;
        let end = start
            .checked_add(chunk_len)
            .filter(|&e| e <= length)
            .ok_or_else(|| invalid("chunk exceeds container length"))?;
        match chunk_type {
            CHUNK_JSON if json_chunk.is_none() => json_chunk = Some(&bytes[start..end]),
            CHUNK_BIN if bin_chunk.is_none() => bin_chunk = Some(&bytes[start..end]),
            _ => {}
        }
        offset = end;
    }

    let json_chunk = json_chunk.ok_or_else(|| invalid("missing JSON chunk"))?;
    Ok((json_chunk, bin_chunk))
}

fn checked<T: Copy>(value: &Checked<T>, what: &str) -> Result<T> {
    match value {
        Checked::Valid(v) => Ok(*v),
        Checked::Invalid => Err(invalid(format!("invalid {}", what))),
    }
}

fn component_size(ct: json::accessor::ComponentType) -> usize {
    use json::accessor::ComponentType::*;
    match ct {
        I8 | U8 => 1,
        I16 | U16 => 2,
        U32 | F32 => 4,
    }
}

fn read_component(bytes: &[u8], ct: json::accessor::ComponentType, normalized: bool) -> f32 {
    use json::accessor::ComponentType::*;
    match ct {
        F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        U32 => {
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if normalized {
                (v as f64 / u32::MAX as f64) as f32
            } else {
                v as f32
            }
        }
        U16 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized {
                v / 65535.0
            } else {
                v
            }
        }
        I16 => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized {
                (v / 32767.0).max(-1.0)
            } else {
                v
            }
        }
        U8 => {
            let v = bytes[0] as f32;
            if normalized {
                v / 255.0
            } else {
                v
            }
        }
        I8 => {
            let v = bytes[0] as i8 as f32;
            if normalized {
                (v / 127.0).max(-1.0)
            } else {
                v
            }
        }
    }
}

fn read_index(bytes: &[u8], ct: json::accessor::ComponentType) -> Result<u32> {
    use json::accessor::ComponentType::*;
    match ct {
        U8 => Ok(bytes[0] as u32),
        U16 => Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as u32),
        U32 => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        other => Err(invalid(format!("index component type {:?}", other))),
    }
}

struct Reader<'a> {
    root: &'a json::Root,
    buffers: Vec<Option<&'a [u8]>>,
    /// First declared geometry compression extension.
    compression: Option<&'a str>,
}

impl<'a> Reader<'a> {
    fn view_bytes(&self, index: usize) -> Result<(&'a [u8], Option<usize>)> {
        let view = self
            .root
            .buffer_views
            .get(index)
            .ok_or_else(|| invalid(format!("buffer view {} out of range", index)))?;
        let buffer = match self.buffers.get(view.buffer.value()).copied().flatten() {
            Some(buffer) => buffer,
            // A meshopt fallback buffer carries no bytes of its own.
            None => match self.compression {
                Some(ext) => {
                    return Err(ExportError::CompressedGeometry(format!(
                        "buffer view {} only has {} data",
                        index, ext
                    )))
                }
                None => return Err(invalid(format!("buffer {} has no embedded data", view.buffer.value()))),
            },
        };
        let start = view.byte_offset.map(|o| o.0 as usize).unwrap_or(0);
        let slice = start
            .checked_add(view.byte_length.0 as usize)
            .and_then(|end| buffer.get(start..end))
            .ok_or_else(|| invalid(format!("buffer view {} exceeds buffer", index)))?;
        Ok((slice, view.byte_stride.map(|s| s.0)))
    }

    /// Decode accessor `index`. Returns `None` when the accessor has no
    /// buffer view, which leaves its data to a compression extension.
    fn accessor(&self, index: usize, as_indices: bool) -> Result<Option<Accessor>> {
        let accessor = self
            .root
            .accessors
            .get(index)
            .ok_or_else(|| invalid(format!("accessor {} out of range", index)))?;
        if accessor.sparse.is_some() {
            return Err(invalid(format!("sparse accessor {} is not supported", index)));
        }
        let Some(view) = accessor.buffer_view else {
            return Ok(None);
        };

        let ct = checked(&accessor.component_type, "component type")?.0;
        let kind = checked(&accessor.type_, "accessor type")?;
        let count = accessor.count.0 as usize;
        let n = components(kind);
        let size = component_size(ct);
        let element = n * size;

        let (bytes, stride) = self.view_bytes(view.value())?;
        let stride = stride.unwrap_or(element);
        if stride < element {
            return Err(invalid(format!("accessor {} has a stride shorter than its elements", index)));
        }
        let offset = accessor.byte_offset.map(|o| o.0 as usize).unwrap_or(0);
        if count > 0 {
            let end = (count - 1)
                .checked_mul(stride)
                .and_then(|v| v.checked_add(offset))
                .and_then(|v| v.checked_add(element));
            if end.map_or(true, |end| end > bytes.len()) {
                return Err(invalid(format!("accessor {} exceeds its buffer view", index)));
            }
        }

        let data = if as_indices {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let at = offset + i * stride;
                out.push(read_index(&bytes[at..at + size], ct)?);
            }
            AccessorData::U32(out)
        } else {
            let mut out = Vec::with_capacity(count * n);
            for i in 0..count {
                for c in 0..n {
                    let at = offset + i * stride + c * size;
                    out.push(read_component(&bytes[at..at + size], ct, accessor.normalized));
                }
            }
            AccessorData::F32(out)
        };

        Ok(Some(Accessor::new(data, kind)))
    }
}

fn attribute(semantic: &Checked<json::mesh::Semantic>) -> Option<Attribute> {
    use json::mesh::Semantic;
    match semantic {
        Checked::Valid(Semantic::Positions) => Some(Attribute::Position),
        Checked::Valid(Semantic::Normals) => Some(Attribute::Normal),
        Checked::Valid(Semantic::Tangents) => Some(Attribute::Tangent),
        Checked::Valid(Semantic::TexCoords(i)) => Some(Attribute::TexCoord(*i)),
        Checked::Valid(Semantic::Colors(i)) => Some(Attribute::Color(*i)),
        _ => None,
    }
}

fn texture_ref(info: &Option<json::texture::Info>) -> Option<TextureRef> {
    info.as_ref().map(|i| TextureRef {
        texture: i.index.value(),
        tex_coord: i.tex_coord,
    })
}

fn material(m: &json::Material) -> Material {
    let pbr = &m.pbr_metallic_roughness;
    Material {
        name: m.name.clone(),
        base_color: pbr.base_color_factor.0,
        metallic: pbr.metallic_factor.0,
        roughness: pbr.roughness_factor.0,
        base_color_texture: texture_ref(&pbr.base_color_texture),
        metallic_roughness_texture: texture_ref(&pbr.metallic_roughness_texture),
        normal_texture: m.normal_texture.as_ref().map(|t| TextureRef {
            texture: t.index.value(),
            tex_coord: t.tex_coord,
        }),
        normal_scale: m.normal_texture.as_ref().map(|t| t.scale).unwrap_or(1.0),
        occlusion_texture: m.occlusion_texture.as_ref().map(|t| TextureRef {
            texture: t.index.value(),
            tex_coord: t.tex_coord,
        }),
        occlusion_strength: m
            .occlusion_texture
            .as_ref()
            .map(|t| t.strength.0)
            .unwrap_or(1.0),
        emissive_texture: texture_ref(&m.emissive_texture),
        emissive: m.emissive_factor.0,
        alpha_mode: match m.alpha_mode {
            Checked::Valid(mode) => mode,
            Checked::Invalid => json::material::AlphaMode::Opaque,
        },
        alpha_cutoff: m.alpha_cutoff.map(|c| c.0),
        double_sided: m.double_sided,
    }
}

fn node(n: &json::Node) -> Node {
    let (scale, rotation, translation) = match n.matrix {
        Some(m) => Mat4::from_cols_array(&m).to_scale_rotation_translation(),
        None => (
            n.scale.map(Vec3::from).unwrap_or(Vec3::ONE),
            n.rotation
                .map(|q| Quat::from_array(q.0))
                .unwrap_or(Quat::IDENTITY),
            n.translation.map(Vec3::from).unwrap_or(Vec3::ZERO),
        ),
    };
    Node {
        name: n.name.clone(),
        mesh: n.mesh.map(|m| m.value()),
        children: n
            .children
            .as_ref()
            .map(|c| c.iter().map(|i| i.value()).collect())
            .unwrap_or_default(),
        translation,
        rotation,
        scale,
    }
}

fn mime_for(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg".to_string(),
        Ok(image::ImageFormat::WebP) => "image/webp".to_string(),
        _ => "image/png".to_string(),
    }
}

/// Parse a GLB into a standalone document.
pub fn read_glb(bytes: &[u8]) -> Result<Document> {
    let (json_chunk, bin) = split_glb(bytes)?;
    let root: json::Root = serde_json::from_slice(json_chunk)?;

    if let Some(ext) = root
        .extensions_required
        .iter()
        .find(|e| !DECODED_EXTENSIONS.contains(&e.as_str()))
    {
        return Err(invalid(format!("required extension {} is not supported", ext)));
    }

    let buffers = root
        .buffers
        .iter()
        .enumerate()
        .map(|(i, b)| match (&b.uri, i) {
            (None, 0) => bin,
            _ => None,
        })
        .collect();
    let compression = root
        .extensions_used
        .iter()
        .map(String::as_str)
        .find(|e| COMPRESSION_EXTENSIONS.contains(e));
    let reader = Reader {
        root: &root,
        buffers,
        compression,
    };
    let compressed_only = |mi: usize, what: &str| match compression {
        Some(ext) => ExportError::CompressedGeometry(format!("mesh {} stores its {} only as {}", mi, what, ext)),
        None => invalid(format!("mesh {} has {} without a buffer view", mi, what)),
    };

    let mut index_accessors = HashSet::new();
    for mesh in &root.meshes {
        for prim in &mesh.primitives {
            if let Some(i) = prim.indices {
                index_accessors.insert(i.value());
            }
        }
    }

    let mut doc = Document::new();
    for ext in &root.extensions_used {
        if COMPRESSION_EXTENSIONS.contains(&ext.as_str()) {
            tracing::debug!(extension = %ext, "stripping geometry compression marker");
        } else if !DECODED_EXTENSIONS.contains(&ext.as_str()) {
            doc.extensions_used.insert(ext.clone());
        }
    }

    // Accessors are decoded on demand; compressed-only ones stay `None`.
    let mut accessor_map: Vec<Option<usize>> = vec![None; root.accessors.len()];
    let mut decode = |doc: &mut Document, index: usize| -> Result<Option<usize>> {
        if let Some(existing) = accessor_map.get(index).copied().flatten() {
            return Ok(Some(existing));
        }
        match reader.accessor(index, index_accessors.contains(&index))? {
            Some(accessor) => {
                let new_index = doc.add_accessor(accessor);
                accessor_map[index] = Some(new_index);
                Ok(Some(new_index))
            }
            None => Ok(None),
        }
    };

    for (mi, mesh) in root.meshes.iter().enumerate() {
        let mut primitives = Vec::with_capacity(mesh.primitives.len());
        for prim in &mesh.primitives {
            let mut attributes = BTreeMap::new();
            for (semantic, accessor) in &prim.attributes {
                let Some(attr) = attribute(semantic) else {
                    continue;
                };
                let decoded = decode(&mut doc, accessor.value())?.ok_or_else(|| compressed_only(mi, "vertices"))?;
                attributes.insert(attr, decoded);
            }
            if !attributes.contains_key(&Attribute::Position) {
                return Err(invalid(format!("mesh {} primitive has no positions", mi)));
            }
            let indices = match prim.indices {
                Some(i) => Some(decode(&mut doc, i.value())?.ok_or_else(|| compressed_only(mi, "indices"))?),
                None => None,
            };
            primitives.push(Primitive {
                attributes,
                indices,
                material: prim.material.map(|m| m.value()),
                mode: checked(&prim.mode, "primitive mode")?,
            });
        }
        doc.meshes.push(Mesh {
            name: mesh.name.clone(),
            primitives,
        });
    }

    for (i, img) in root.images.iter().enumerate() {
        let Some(view) = img.buffer_view else {
            return Err(invalid(format!("image {} is not embedded", i)));
        };
        let (data, _) = reader.view_bytes(view.value())?;
        let mime_type = img
            .mime_type
            .as_ref()
            .map(|m| m.0.clone())
            .unwrap_or_else(|| mime_for(data));
        doc.images.push(Image {
            name: img.name.clone(),
            mime_type,
            data: data.to_vec(),
        });
    }

    for s in &root.samplers {
        doc.samplers.push(Sampler {
            mag_filter: s.mag_filter.as_ref().and_then(|f| checked(f, "filter").ok()),
            min_filter: s.min_filter.as_ref().and_then(|f| checked(f, "filter").ok()),
            wrap_s: checked(&s.wrap_s, "wrap mode").unwrap_or(WrappingMode::Repeat),
            wrap_t: checked(&s.wrap_t, "wrap mode").unwrap_or(WrappingMode::Repeat),
        });
    }

    for t in &root.textures {
        doc.textures.push(Texture {
            name: t.name.clone(),
            image: t.source.value(),
            sampler: t.sampler.map(|s| s.value()),
        });
    }

    doc.materials = root.materials.iter().map(material).collect();
    doc.nodes = root.nodes.iter().map(node).collect();
    doc.scenes = root
        .scenes
        .iter()
        .map(|s| Scene {
            name: s.name.clone(),
            nodes: s.nodes.iter().map(|n| n.value()).collect(),
        })
        .collect();
    if doc.scenes.is_empty() && !doc.nodes.is_empty() {
        doc.scenes.push(Scene {
            name: None,
            nodes: root_nodes(&doc),
        });
    }
    doc.default_scene = root
        .scene
        .map(|s| s.value())
        .or(if doc.scenes.is_empty() { None } else { Some(0) });

    validate_references(&doc)?;
    Ok(doc)
}

/// Nodes that are nobody's child.
fn root_nodes(doc: &Document) -> Vec<usize> {
    let children: HashSet<usize> = doc.nodes.iter().flat_map(|n| n.children.iter().copied()).collect();
    (0..doc.nodes.len()).filter(|i| !children.contains(i)).collect()
}

fn validate_references(doc: &Document) -> Result<()> {
    let in_range = |index: usize, len: usize, what: &str| {
        if index < len {
            Ok(())
        } else {
            Err(invalid(format!("{} index {} out of range", what, index)))
        }
    };
    for node in &doc.nodes {
        if let Some(m) = node.mesh {
            in_range(m, doc.meshes.len(), "mesh")?;
        }
        for &c in &node.children {
            in_range(c, doc.nodes.len(), "node")?;
        }
    }
    for mesh in &doc.meshes {
        for prim in &mesh.primitives {
            if let Some(m) = prim.material {
                in_range(m, doc.materials.len(), "material")?;
            }
        }
    }
    for material in &doc.materials {
        for slot in [
            material.base_color_texture,
            material.metallic_roughness_texture,
            material.normal_texture,
            material.occlusion_texture,
            material.emissive_texture,
        ]
        .into_iter()
        .flatten()
        {
            in_range(slot.texture, doc.textures.len(), "texture")?;
        }
    }
    for texture in &doc.textures {
        in_range(texture.image, doc.images.len(), "image")?;
        if let Some(s) = texture.sampler {
            in_range(s, doc.samplers.len(), "sampler")?;
        }
    }
    for scene in &doc.scenes {
        for &n in &scene.nodes {
            in_range(n, doc.nodes.len(), "node")?;
        }
    }
    if let Some(s) = doc.default_scene {
        in_range(s, doc.scenes.len(), "scene")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::gltf::write_glb;
    use crate::mesher::{self, Vertex};

    fn sample_doc() -> Document {
        let mut mesh = mesher::Mesh::new();
        let a = mesh.add_vertex(Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]));
        let b = mesh.add_vertex(Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]));
        let c = mesh.add_vertex(Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]));
        mesh.add_triangle(a, b, c);

        let mut doc = Document::new();
        let material = doc.add_material(Material {
            name: Some("Paint".into()),
            base_color: [0.5, 0.25, 1.0, 1.0],
            ..Default::default()
        });
        let m = doc.add_triangle_mesh("Tri", &mesh, Some(material));
        let root = doc.add_node(Node::new("Root").with_translation(Vec3::new(1.0, 2.0, 3.0)));
        doc.add_child(root, Node::new("Seat").with_mesh(m));
        doc.add_scene(Scene {
            name: None,
            nodes: vec![root],
        });
        doc.default_scene = Some(0);
        doc
    }

    #[test]
    fn test_read_back_written_glb() {
        let glb = write_glb(&sample_doc()).unwrap();
        let doc = read_glb(&glb).unwrap();

        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(doc.nodes[1].name.as_deref(), Some("Seat"));
        assert_eq!(doc.materials[0].base_color, [0.5, 0.25, 1.0, 1.0]);
        let prim = &doc.meshes[0].primitives[0];
        let positions = &doc.accessors[prim.attributes[&Attribute::Position]];
        assert_eq!(positions.count(), 3);
        assert_eq!(
            doc.accessors[prim.indices.unwrap()].data,
            AccessorData::U32(vec![0, 1, 2])
        );
        assert_eq!(doc.default_scene, Some(0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(read_glb(b"not a glb at all, really"), Err(ExportError::InvalidContainer(_))));
        let mut glb = write_glb(&sample_doc()).unwrap();
        glb[4] = 1;
        assert!(read_glb(&glb).is_err());
    }

    #[test]
    fn test_draco_only_primitive_names_extension() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["KHR_draco_mesh_compression"],
            "extensionsRequired": ["KHR_draco_mesh_compression"],
            "accessors": [{"componentType": 5126, "count": 3, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "nodes": [{"mesh": 0}],
            "scenes": [{"nodes": [0]}]
        }"#;
        let glb = container(json.as_bytes(), &[]);
        match read_glb(&glb) {
            Err(ExportError::CompressedGeometry(message)) => {
                assert_eq!(message, "mesh 0 stores its vertices only as KHR_draco_mesh_compression")
            }
            other => panic!("unexpected result {:?}", other.map(|d| d.meshes.len())),
        }
    }

    #[test]
    fn test_meshopt_fallback_buffer_is_reported() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["EXT_meshopt_compression"],
            "buffers": [{"byteLength": 4}, {"byteLength": 36}],
            "bufferViews": [{"buffer": 1, "byteLength": 36}],
            "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
        }"#;
        let err = read_glb(&container(json.as_bytes(), &[0; 4])).unwrap_err();
        assert!(matches!(err, ExportError::CompressedGeometry(ref m) if m.contains("EXT_meshopt_compression")));
    }

    #[test]
    fn test_missing_view_without_compression_is_invalid() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "accessors": [{"componentType": 5126, "count": 3, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
        }"#;
        assert!(matches!(read_glb(&container(json.as_bytes(), &[])), Err(ExportError::InvalidContainer(_))));
    }

    #[test]
    fn test_huge_accessor_count_is_rejected() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "buffers": [{"byteLength": 12}],
            "bufferViews": [{"buffer": 0, "byteLength": 12}],
            "accessors": [{"bufferView": 0, "componentType": 5126, "count": 4611686018427387904, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
        }"#;
        let err = read_glb(&container(json.as_bytes(), &[0; 12])).unwrap_err();
        assert!(matches!(err, ExportError::InvalidContainer(ref m) if m.contains("exceeds")), "{}", err);
    }

    #[test]
    fn test_view_past_buffer_end_is_rejected() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "buffers": [{"byteLength": 12}],
            "bufferViews": [{"buffer": 0, "byteOffset": 18446744073709551615, "byteLength": 12}],
            "accessors": [{"bufferView": 0, "componentType": 5126, "count": 1, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
        }"#;
        assert!(matches!(read_glb(&container(json.as_bytes(), &[0; 12])), Err(ExportError::InvalidContainer(_))));
    }

    #[test]
    fn test_unsupported_required_extension() {
        let json = r#"{"asset": {"version": "2.0"}, "extensionsRequired": ["KHR_texture_basisu"]}"#;
        assert!(read_glb(&container(json.as_bytes(), &[])).is_err());
    }

    #[test]
    fn test_matrix_and_quantized_positions() {
        // One normalized i16 VEC3 padded to an 8-byte stride, and a node matrix.
        let mut bin = Vec::new();
        for v in [[32767i16, 0, 0], [0, 32767, 0], [0, 0, -32767]] {
            for c in v {
                bin.extend_from_slice(&c.to_le_bytes());
            }
            bin.extend_from_slice(&[0, 0]);
        }
        let json = format!(
            r#"{{
            "asset": {{"version": "2.0"}},
            "extensionsRequired": ["KHR_mesh_quantization"],
            "buffers": [{{"byteLength": {len}}}],
            "bufferViews": [{{"buffer": 0, "byteLength": {len}, "byteStride": 8}}],
            "accessors": [{{"bufferView": 0, "componentType": 5122, "normalized": true, "count": 3, "type": "VEC3"}}],
            "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}}}]}}],
            "nodes": [{{"mesh": 0, "matrix": [2,0,0,0, 0,2,0,0, 0,0,2,0, 5,6,7,1]}}]
        }}"#,
            len = bin.len()
        );
        let doc = read_glb(&container(json.as_bytes(), &bin)).unwrap();
        assert_eq!(
            doc.accessors[0].data,
            AccessorData::F32(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
        );
        assert_eq!(doc.nodes[0].translation, Vec3::new(5.0, 6.0, 7.0));
        assert!((doc.nodes[0].scale - Vec3::splat(2.0)).length() < 1e-6);
        // No scenes declared: the root node becomes the implicit scene.
        assert_eq!(doc.scenes[0].nodes, vec![0]);
    }

    fn container(json: &[u8], bin: &[u8]) -> Vec<u8> {
        let mut json = json.to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + if bin.is_empty() { 0 } else { 8 + bin.len() };
        let mut out = Vec::new();
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(&json);
        if !bin.is_empty() {
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(&bin);
        }
        out
    }
}
