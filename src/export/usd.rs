//! USDA/USDZ writer.
//!
//! Every mesh instance is flattened to world space, so the stage is a flat
//! list of Mesh prims under one `Root` xform. The USDZ package is a stored
//! ZIP whose entries start on 64-byte boundaries.

use crate::document::{Attribute, Document, Material, Mode};
use crate::error::{ExportError, Result};
use glam::{Mat3, Mat4, Vec3};
use std::fmt::Write;
use std::io::Write as _;

/// An image packaged next to the root layer.
pub struct UsdTexture {
    /// Archive path, `textures/image_{n}.{ext}`.
    pub filename: String,
    pub data: Vec<u8>,
}

/// Root layer text and the images it references.
pub struct UsdaExport {
    pub usda: String,
    pub textures: Vec<UsdTexture>,
}

/// Triangles of one primitive in world space.
struct FlatMesh {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

/// Export a document as USDA text plus texture files.
pub fn export_usda(doc: &Document) -> Result<UsdaExport> {
    let world = doc.world_matrices();
    let mut prims = Vec::new();
    for (node_index, node) in doc.nodes.iter().enumerate() {
        let (Some(mesh_index), Some(matrix)) = (node.mesh, world[node_index]) else {
            continue;
        };
        let Some(mesh) = doc.meshes.get(mesh_index) else {
            continue;
        };
        for (p, prim) in mesh.primitives.iter().enumerate() {
            if prim.mode != Mode::Triangles {
                continue;
            }
            if let Some(flat) = flatten_primitive(doc, prim, matrix) {
                let base = node.name.as_deref().or(mesh.name.as_deref()).unwrap_or("mesh");
                let name = format!("{}_{}_{}", prim_identifier(base), node_index, p);
                prims.push((name, flat, prim.material));
            }
        }
    }
    if prims.is_empty() {
        return Err(ExportError::Export("Cannot export empty mesh".to_string()));
    }

    let vertices: usize = prims.iter().map(|(_, m, _)| m.positions.len()).sum();
    let mut usda = Usda::with_capacity(2048 + vertices * 200);
    usda.out.push_str(STAGE_HEADER);
    usda.open("def Xform \"Root\"");

    let mut textures = Vec::new();
    let mut image_files: Vec<Option<String>> = vec![None; doc.images.len()];
    for (i, image) in doc.images.iter().enumerate() {
        let ext = match image.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            _ => continue,
        };
        let filename = format!("textures/image_{}.{}", i, ext);
        textures.push(UsdTexture {
            filename: filename.clone(),
            data: image.data.clone(),
        });
        image_files[i] = Some(filename);
    }

    for (i, material) in doc.materials.iter().enumerate() {
        let texture = material
            .base_color_texture
            .and_then(|t| doc.textures.get(t.texture))
            .and_then(|t| image_files.get(t.image).cloned().flatten());
        write_material(&mut usda, &format!("material_{}", i), material, texture.as_deref());
    }
    let default_material = Material {
        metallic: 0.0,
        ..Default::default()
    };
    if prims.iter().any(|(_, _, m)| m.is_none()) {
        write_material(&mut usda, "material_default", &default_material, None);
    }

    for (name, mesh, material) in &prims {
        let material_name = match material {
            Some(m) => format!("material_{}", m),
            None => "material_default".to_string(),
        };
        write_mesh_prim(&mut usda, name, mesh, &material_name);
    }

    usda.close();

    Ok(UsdaExport {
        usda: usda.out,
        textures,
    })
}

/// Export a document as a USDZ archive (zero-compression ZIP with 64-byte alignment).
pub fn export_usdz(doc: &Document) -> Result<Vec<u8>> {
    let export = export_usda(doc)?;

    // The root layer must be the first entry.
    let entries = std::iter::once(("root.usda", export.usda.as_bytes()))
        .chain(export.textures.iter().map(|t| (t.filename.as_str(), t.data.as_slice())));

    let stored = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .with_alignment(64);
    let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        archive.start_file(name, stored)?;
        archive.write_all(data)?;
    }
    Ok(archive.finish()?.into_inner())
}

/// Transform one triangle primitive into world space.
fn flatten_primitive(doc: &Document, prim: &crate::document::Primitive, matrix: Mat4) -> Option<FlatMesh> {
    let positions = doc.accessors.get(*prim.attributes.get(&Attribute::Position)?)?.to_f32();
    let count = positions.len() / 3;
    if count == 0 {
        return None;
    }

    let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
    let flip = matrix.determinant() < 0.0;

    let positions: Vec<[f32; 3]> = positions
        .chunks_exact(3)
        .map(|p| matrix.transform_point3(Vec3::new(p[0], p[1], p[2])).to_array())
        .collect();
    let normals = prim
        .attributes
        .get(&Attribute::Normal)
        .and_then(|&a| doc.accessors.get(a))
        .map(|a| a.to_f32())
        .filter(|n| n.len() == count * 3)
        .map(|n| {
            n.chunks_exact(3)
                .map(|v| (normal_matrix * Vec3::new(v[0], v[1], v[2])).normalize_or_zero().to_array())
                .collect()
        })
        .unwrap_or_default();
    // USD's st origin is bottom-left.
    let uvs = prim
        .attributes
        .get(&Attribute::TexCoord(0))
        .and_then(|&a| doc.accessors.get(a))
        .map(|a| a.to_f32())
        .filter(|uv| uv.len() == count * 2)
        .map(|uv| uv.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]).collect())
        .unwrap_or_default();

    let mut indices: Vec<u32> = match prim.indices.and_then(|i| doc.accessors.get(i)) {
        Some(a) => (0..a.data.len()).map(|i| a.data.get(i) as u32).collect(),
        None => (0..count as u32).collect(),
    };
    indices.truncate(indices.len() / 3 * 3);
    if indices.is_empty() || indices.iter().any(|&i| i as usize >= count) {
        return None;
    }
    if flip {
        for tri in indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    Some(FlatMesh {
        positions,
        normals,
        uvs,
        indices,
    })
}

/// USD prim names must be identifiers.
fn prim_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

const STAGE_HEADER: &str = "#usda 1.0
(
    defaultPrim = \"Root\"
    metersPerUnit = 1
    upAxis = \"Y\"
)

";

/// Indented USDA text.
struct Usda {
    out: String,
    depth: usize,
}

impl Usda {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        self.indent();
        writeln!(self.out, "{}", text).unwrap();
    }

    fn open(&mut self, header: impl std::fmt::Display) {
        self.line(header);
        self.line("{");
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// `decl = [a, b, ...]`, optionally tagged as a per-vertex primvar.
    fn array<T>(&mut self, decl: &str, items: &[T], per_vertex: bool, mut item: impl FnMut(&mut String, &T)) {
        self.indent();
        write!(self.out, "{} = [", decl).unwrap();
        for (i, value) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            item(&mut self.out, value);
        }
        if per_vertex {
            self.out.push_str("] (\n");
            self.depth += 1;
            self.line("interpolation = \"vertex\"");
            self.depth -= 1;
            self.line(")");
        } else {
            self.out.push_str("]\n");
        }
    }
}

/// A UsdPreviewSurface material. With a texture, the base colour factor
/// becomes the texture's scale.
fn write_material(usda: &mut Usda, name: &str, material: &Material, texture_path: Option<&str>) {
    let [r, g, b, a] = material.base_color;
    usda.open(format_args!("def Material \"{}\"", name));
    usda.line(format_args!(
        "token outputs:surface.connect = </Root/{}/shader.outputs:surface>",
        name
    ));

    usda.open("def Shader \"shader\"");
    usda.line("uniform token info:id = \"UsdPreviewSurface\"");
    match texture_path {
        Some(_) => usda.line(format_args!(
            "color3f inputs:diffuseColor.connect = </Root/{}/diffuse.outputs:rgb>",
            name
        )),
        None => usda.line(format_args!("color3f inputs:diffuseColor = ({}, {}, {})", r, g, b)),
    }
    usda.line(format_args!("float inputs:metallic = {}", material.metallic));
    usda.line(format_args!("float inputs:roughness = {}", material.roughness));
    usda.line(format_args!("float inputs:opacity = {}", a));
    usda.line("token outputs:surface");
    usda.close();

    if let Some(path) = texture_path {
        usda.open("def Shader \"diffuse\"");
        usda.line("uniform token info:id = \"UsdUVTexture\"");
        usda.line(format_args!("asset inputs:file = @{}@", path));
        usda.line(format_args!("float2 inputs:st.connect = </Root/{}/st.outputs:result>", name));
        usda.line(format_args!("float4 inputs:scale = ({}, {}, {}, {})", r, g, b, a));
        usda.line("token inputs:wrapS = \"repeat\"");
        usda.line("token inputs:wrapT = \"repeat\"");
        usda.line("float3 outputs:rgb");
        usda.close();

        usda.open("def Shader \"st\"");
        usda.line("uniform token info:id = \"UsdPrimvarReader_float2\"");
        usda.line("string inputs:varname = \"st\"");
        usda.line("float2 outputs:result");
        usda.close();
    }

    usda.close();
}

fn write_mesh_prim(usda: &mut Usda, name: &str, mesh: &FlatMesh, material: &str) {
    usda.open(format_args!("def Mesh \"{}\"", name));
    usda.line("uniform bool doubleSided = 1");

    let counts = vec![3u8; mesh.indices.len() / 3];
    usda.array("int[] faceVertexCounts", &counts, false, |s, n| write!(s, "{}", n).unwrap());
    usda.array("int[] faceVertexIndices", &mesh.indices, false, |s, i| write!(s, "{}", i).unwrap());
    usda.array("point3f[] points", &mesh.positions, false, |s, p| {
        write!(s, "({}, {}, {})", p[0], p[1], p[2]).unwrap()
    });
    if !mesh.normals.is_empty() {
        usda.array("normal3f[] normals", &mesh.normals, true, |s, n| {
            write!(s, "({}, {}, {})", n[0], n[1], n[2]).unwrap()
        });
    }
    if !mesh.uvs.is_empty() {
        usda.array("texCoord2f[] primvars:st", &mesh.uvs, true, |s, t| {
            write!(s, "({}, {})", t[0], t[1]).unwrap()
        });
    }

    usda.line(format_args!("rel material:binding = </Root/{}>", material));
    usda.close();
}
