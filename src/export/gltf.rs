//! glTF/GLB export.

use crate::document::{components, Accessor, Attribute, Document, Material, TextureRef};
use crate::error::{ExportError, Result};
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use std::collections::{BTreeMap, HashSet};

/// Serialize a document to GLB (binary glTF).
///
/// Only accessors referenced by a primitive are written. Every buffer view
/// starts on a 4-byte boundary and vertex attribute elements are padded to
/// a 4-byte stride.
pub fn write_glb(doc: &Document) -> Result<Vec<u8>> {
    if doc.nodes.is_empty() {
        return Err(ExportError::Export("Cannot export empty document".to_string()));
    }

    let index_accessors: HashSet<usize> = doc
        .meshes
        .iter()
        .flat_map(|m| m.primitives.iter().filter_map(|p| p.indices))
        .collect();
    let position_accessors: HashSet<usize> = doc
        .meshes
        .iter()
        .flat_map(|m| m.primitives.iter().filter_map(|p| p.attributes.get(&Attribute::Position).copied()))
        .collect();

    let mut buffer_data: Vec<u8> = Vec::new();
    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();

    // Source accessor index -> written accessor index.
    let mut accessor_map: Vec<Option<u32>> = vec![None; doc.accessors.len()];
    let mut write_accessor = |index: usize,
                              buffer_data: &mut Vec<u8>,
                              buffer_views: &mut Vec<json::buffer::View>,
                              accessors: &mut Vec<json::Accessor>|
     -> Result<u32> {
        if let Some(written) = accessor_map.get(index).copied().flatten() {
            return Ok(written);
        }
        let accessor = doc
            .accessors
            .get(index)
            .ok_or_else(|| ExportError::Export(format!("accessor {} out of range", index)))?;
        let is_index = index_accessors.contains(&index);

        align(buffer_data, 4);
        let offset = buffer_data.len();
        let stride = append_accessor_data(buffer_data, accessor, is_index);
        let view_index = buffer_views.len() as u32;
        buffer_views.push(create_buffer_view(
            offset,
            buffer_data.len() - offset,
            stride,
            Some(if is_index {
                json::buffer::Target::ElementArrayBuffer
            } else {
                json::buffer::Target::ArrayBuffer
            }),
        ));

        let bounds = if position_accessors.contains(&index) {
            accessor.bounds()
        } else {
            None
        };
        let written = accessors.len() as u32;
        accessors.push(create_accessor(view_index, accessor, bounds));
        accessor_map[index] = Some(written);
        Ok(written)
    };

    let mut meshes = Vec::with_capacity(doc.meshes.len());
    for mesh in &doc.meshes {
        let mut primitives = Vec::with_capacity(mesh.primitives.len());
        for prim in &mesh.primitives {
            let mut attributes = BTreeMap::new();
            for (attribute, &source) in &prim.attributes {
                let written = write_accessor(source, &mut buffer_data, &mut buffer_views, &mut accessors)?;
                attributes.insert(Valid(semantic(*attribute)), json::Index::new(written));
            }
            let indices = match prim.indices {
                Some(source) => Some(json::Index::new(write_accessor(
                    source,
                    &mut buffer_data,
                    &mut buffer_views,
                    &mut accessors,
                )?)),
                None => None,
            };
            primitives.push(json::mesh::Primitive {
                attributes,
                extensions: Default::default(),
                extras: Default::default(),
                indices,
                material: prim.material.map(|m| json::Index::new(m as u32)),
                mode: Valid(prim.mode),
                targets: None,
            });
        }
        meshes.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: mesh.name.clone(),
            primitives,
            weights: None,
        });
    }

    // Embedded images (aligned to 4 bytes)
    let mut images = Vec::with_capacity(doc.images.len());
    for image in &doc.images {
        align(&mut buffer_data, 4);
        let offset = buffer_data.len();
        buffer_data.extend_from_slice(&image.data);
        let view_index = buffer_views.len() as u32;
        buffer_views.push(create_buffer_view(offset, image.data.len(), None, None));
        images.push(json::Image {
            buffer_view: Some(json::Index::new(view_index)),
            mime_type: Some(json::image::MimeType(image.mime_type.clone())),
            name: image.name.clone(),
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
    }

    let total_buffer_size = buffer_data.len();

    let root = json::Root {
        accessors,
        buffers: if total_buffer_size > 0 {
            vec![json::Buffer {
                byte_length: USize64(total_buffer_size as u64),
                extensions: Default::default(),
                extras: Default::default(),
                name: None,
                uri: None,
            }]
        } else {
            Vec::new()
        },
        buffer_views,
        images,
        samplers: doc
            .samplers
            .iter()
            .map(|s| json::texture::Sampler {
                mag_filter: s.mag_filter.map(Valid),
                min_filter: s.min_filter.map(Valid),
                name: None,
                wrap_s: Valid(s.wrap_s),
                wrap_t: Valid(s.wrap_t),
                extensions: Default::default(),
                extras: Default::default(),
            })
            .collect(),
        textures: doc
            .textures
            .iter()
            .map(|t| json::Texture {
                name: t.name.clone(),
                sampler: t.sampler.map(|s| json::Index::new(s as u32)),
                source: json::Index::new(t.image as u32),
                extensions: Default::default(),
                extras: Default::default(),
            })
            .collect(),
        materials: doc.materials.iter().map(create_material).collect(),
        meshes,
        nodes: doc
            .nodes
            .iter()
            .map(|n| json::Node {
                camera: None,
                children: if n.children.is_empty() {
                    None
                } else {
                    Some(n.children.iter().map(|&c| json::Index::new(c as u32)).collect())
                },
                extensions: Default::default(),
                extras: Default::default(),
                matrix: None,
                mesh: n.mesh.map(|m| json::Index::new(m as u32)),
                name: n.name.clone(),
                rotation: (n.rotation != glam::Quat::IDENTITY)
                    .then(|| json::scene::UnitQuaternion(n.rotation.to_array())),
                scale: (n.scale != glam::Vec3::ONE).then(|| n.scale.to_array()),
                translation: (n.translation != glam::Vec3::ZERO).then(|| n.translation.to_array()),
                skin: None,
                weights: None,
            })
            .collect(),
        scenes: doc
            .scenes
            .iter()
            .map(|s| json::Scene {
                extensions: Default::default(),
                extras: Default::default(),
                name: s.name.clone(),
                nodes: s.nodes.iter().map(|&n| json::Index::new(n as u32)).collect(),
            })
            .collect(),
        scene: doc.default_scene.map(|s| json::Index::new(s as u32)),
        extensions_used: doc.extensions_used.iter().cloned().collect(),
        extensions_required: doc.extensions_required.iter().cloned().collect(),
        ..Default::default()
    };

    let text = json::serialize::to_string(&root)
        .map_err(|e| ExportError::Export(format!("glTF JSON serialization failed: {}", e)))?;
    Ok(assemble_glb(text.as_bytes(), &buffer_data))
}

const GLB_MAGIC: &[u8; 4] = b"glTF";
const JSON_CHUNK: u32 = 0x4E4F534A;
const BIN_CHUNK: u32 = 0x004E4942;

/// Wrap a JSON document and binary payload in a GLB container.
///
/// The BIN chunk is omitted when there is no binary payload.
pub fn assemble_glb(json_bytes: &[u8], buffer_data: &[u8]) -> Vec<u8> {
    let chunked = |len: usize| 8 + len.div_ceil(4) * 4;
    let mut length = 12 + chunked(json_bytes.len());
    if !buffer_data.is_empty() {
        length += chunked(buffer_data.len());
    }

    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(GLB_MAGIC);
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(length as u32).to_le_bytes());

    push_chunk(&mut out, JSON_CHUNK, json_bytes, b' ');
    if !buffer_data.is_empty() {
        push_chunk(&mut out, BIN_CHUNK, buffer_data, 0);
    }
    out
}

fn push_chunk(out: &mut Vec<u8>, kind: u32, payload: &[u8], pad: u8) {
    let padded = payload.len().div_ceil(4) * 4;
    out.extend_from_slice(&(padded as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(out.len() + padded - payload.len(), pad);
}

fn align(buffer: &mut Vec<u8>, to: usize) {
    let padding = (to - (buffer.len() % to)) % to;
    buffer.extend(std::iter::repeat(0u8).take(padding));
}

/// Append accessor data. Vertex elements are padded to a multiple of four
/// bytes; returns the stride when padding was needed.
fn append_accessor_data(buffer: &mut Vec<u8>, accessor: &Accessor, is_index: bool) -> Option<usize> {
    let n = components(accessor.kind);
    let element = n * accessor.data.component_size();
    let stride = if is_index { element } else { element.div_ceil(4) * 4 };

    for i in 0..accessor.count() {
        for c in 0..n {
            accessor.data.write_le(i * n + c, buffer);
        }
        buffer.extend(std::iter::repeat(0u8).take(stride - element));
    }

    (stride != element).then_some(stride)
}

fn semantic(attribute: Attribute) -> json::mesh::Semantic {
    use json::mesh::Semantic;
    match attribute {
        Attribute::Position => Semantic::Positions,
        Attribute::Normal => Semantic::Normals,
        Attribute::Tangent => Semantic::Tangents,
        Attribute::TexCoord(i) => Semantic::TexCoords(i),
        Attribute::Color(i) => Semantic::Colors(i),
    }
}

/// Create a buffer view.
fn create_buffer_view(
    offset: usize,
    size: usize,
    stride: Option<usize>,
    target: Option<json::buffer::Target>,
) -> json::buffer::View {
    json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64(size as u64),
        byte_offset: Some(USize64(offset as u64)),
        byte_stride: stride.map(json::buffer::Stride),
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: target.map(Valid),
    }
}

/// Create an accessor.
fn create_accessor(
    buffer_view: u32,
    accessor: &Accessor,
    bounds: Option<(Vec<f64>, Vec<f64>)>,
) -> json::Accessor {
    let (min, max) = match bounds {
        Some((min, max)) => (Some(json::Value::from(min)), Some(json::Value::from(max))),
        None => (None, None),
    };
    json::Accessor {
        buffer_view: Some(json::Index::new(buffer_view)),
        byte_offset: Some(USize64(0)),
        count: USize64(accessor.count() as u64),
        component_type: Valid(json::accessor::GenericComponentType(accessor.data.component_type())),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(accessor.kind),
        min,
        max,
        name: None,
        normalized: accessor.normalized,
        sparse: None,
    }
}

fn texture_info(slot: &Option<TextureRef>) -> Option<json::texture::Info> {
    slot.map(|t| json::texture::Info {
        index: json::Index::new(t.texture as u32),
        tex_coord: t.tex_coord,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

/// Create a metallic-roughness material.
fn create_material(material: &Material) -> json::Material {
    json::Material {
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            base_color_texture: texture_info(&material.base_color_texture),
            base_color_factor: json::material::PbrBaseColorFactor(material.base_color),
            metallic_factor: json::material::StrengthFactor(material.metallic),
            roughness_factor: json::material::StrengthFactor(material.roughness),
            metallic_roughness_texture: texture_info(&material.metallic_roughness_texture),
            extensions: Default::default(),
            extras: Default::default(),
        },
        alpha_mode: Valid(material.alpha_mode),
        alpha_cutoff: material.alpha_cutoff.map(json::material::AlphaCutoff),
        double_sided: material.double_sided,
        name: material.name.clone(),
        normal_texture: material.normal_texture.map(|t| json::material::NormalTexture {
            index: json::Index::new(t.texture as u32),
            scale: material.normal_scale,
            tex_coord: t.tex_coord,
            extensions: Default::default(),
            extras: Default::default(),
        }),
        occlusion_texture: material.occlusion_texture.map(|t| json::material::OcclusionTexture {
            index: json::Index::new(t.texture as u32),
            strength: json::material::StrengthFactor(material.occlusion_strength),
            tex_coord: t.tex_coord,
            extensions: Default::default(),
            extras: Default::default(),
        }),
        emissive_texture: texture_info(&material.emissive_texture),
        emissive_factor: json::material::EmissiveFactor(material.emissive),
        extensions: Default::default(),
        extras: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{AccessorData, AccessorType, Node, Scene};
    use crate::import::split_glb;
    use crate::mesher::{Mesh, Vertex};

    fn triangle_document() -> Document {
        let mut mesh = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]] {
            mesh.add_vertex(Vertex::new(p, [0.0, 1.0, 0.0], [p[0], p[2]]));
        }
        mesh.add_triangle(0, 1, 2);

        let mut doc = Document::new();
        let material = doc.add_material(Material::default());
        let m = doc.add_triangle_mesh("Triangle", &mesh, Some(material));
        let node = doc.add_node(Node::new("Triangle").with_mesh(m));
        doc.add_scene(Scene {
            name: None,
            nodes: vec![node],
        });
        doc.default_scene = Some(0);
        doc
    }

    fn json_of(glb: &[u8]) -> serde_json::Value {
        let (json_chunk, _) = split_glb(glb).unwrap();
        serde_json::from_slice(json_chunk).unwrap()
    }

    #[test]
    fn test_export_simple_mesh() {
        let glb = write_glb(&triangle_document()).unwrap();

        let word = |at: usize| u32::from_le_bytes([glb[at], glb[at + 1], glb[at + 2], glb[at + 3]]);
        assert_eq!(&glb[..4], GLB_MAGIC);
        assert_eq!(word(4), 2);
        assert_eq!(word(8) as usize, glb.len());
        assert_eq!(word(16), JSON_CHUNK);
        assert_eq!(glb.len() % 4, 0);

        let json = json_of(&glb);
        assert_eq!(json["accessors"].as_array().unwrap().len(), 4);
        assert_eq!(json["accessors"][0]["min"], serde_json::json!([0.0, 0.0, 0.0]));
        assert_eq!(json["accessors"][0]["max"], serde_json::json!([1.0, 0.0, 1.0]));
        assert_eq!(json["nodes"][0]["name"], "Triangle");
    }

    #[test]
    fn test_export_empty_document_fails() {
        assert!(write_glb(&Document::new()).is_err());
    }

    #[test]
    fn test_unreferenced_accessors_dropped() {
        let mut doc = triangle_document();
        doc.add_accessor(Accessor::new(AccessorData::F32(vec![1.0; 30]), AccessorType::Vec3));
        let json = json_of(&write_glb(&doc).unwrap());
        assert_eq!(json["accessors"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_vertex_elements_padded() {
        let mut doc = triangle_document();
        let positions = doc.meshes[0].primitives[0].attributes[&Attribute::Position];
        doc.accessors[positions] = Accessor {
            data: AccessorData::I16(vec![0, 0, 0, 32767, 0, 0, 0, 0, 32767]),
            kind: AccessorType::Vec3,
            normalized: true,
        };
        doc.extensions_used.insert("KHR_mesh_quantization".into());
        doc.extensions_required.insert("KHR_mesh_quantization".into());

        let json = json_of(&write_glb(&doc).unwrap());
        let view = &json["bufferViews"][0];
        assert_eq!(view["byteStride"], 8);
        assert_eq!(view["byteLength"], 24);
        assert_eq!(json["accessors"][0]["normalized"], true);
        assert_eq!(json["accessors"][0]["max"], serde_json::json!([32767.0, 0.0, 32767.0]));
        assert_eq!(json["extensionsRequired"][0], "KHR_mesh_quantization");
        for view in json["bufferViews"].as_array().unwrap() {
            assert_eq!(view["byteOffset"].as_u64().unwrap_or(0) % 4, 0);
        }
    }
}
