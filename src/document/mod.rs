//! In-memory scene document.
//!
//! A flat arena of nodes, meshes, accessors, materials, textures, images,
//! samplers and scenes, all referenced by index. It mirrors the glTF object
//! model closely enough to be written as GLB directly, and is the unit that
//! gets merged when model instances are placed into a scene.

use crate::mesher;
use glam::{Mat4, Quat, Vec3};
use gltf_json as json;
use std::collections::{BTreeMap, BTreeSet};

pub use json::accessor::Type as AccessorType;
pub use json::material::AlphaMode;
pub use json::mesh::Mode;
pub use json::texture::{MagFilter, MinFilter, WrappingMode};

/// Vertex attribute semantics carried by the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Position,
    Normal,
    Tangent,
    TexCoord(u32),
    Color(u32),
}

/// Typed accessor payload. Values are stored unpacked, one per component.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessorData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I8(Vec<i8>),
}

impl AccessorData {
    /// Number of stored components.
    pub fn len(&self) -> usize {
        match self {
            AccessorData::F32(v) => v.len(),
            AccessorData::U32(v) => v.len(),
            AccessorData::U16(v) => v.len(),
            AccessorData::U8(v) => v.len(),
            AccessorData::I16(v) => v.len(),
            AccessorData::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one component in bytes.
    pub fn component_size(&self) -> usize {
        match self {
            AccessorData::F32(_) | AccessorData::U32(_) => 4,
            AccessorData::U16(_) | AccessorData::I16(_) => 2,
            AccessorData::U8(_) | AccessorData::I8(_) => 1,
        }
    }

    pub fn component_type(&self) -> json::accessor::ComponentType {
        use json::accessor::ComponentType;
        match self {
            AccessorData::F32(_) => ComponentType::F32,
            AccessorData::U32(_) => ComponentType::U32,
            AccessorData::U16(_) => ComponentType::U16,
            AccessorData::U8(_) => ComponentType::U8,
            AccessorData::I16(_) => ComponentType::I16,
            AccessorData::I8(_) => ComponentType::I8,
        }
    }

    /// Component `i` widened to f64, without normalization.
    pub fn get(&self, i: usize) -> f64 {
        match self {
            AccessorData::F32(v) => v[i] as f64,
            AccessorData::U32(v) => v[i] as f64,
            AccessorData::U16(v) => v[i] as f64,
            AccessorData::U8(v) => v[i] as f64,
            AccessorData::I16(v) => v[i] as f64,
            AccessorData::I8(v) => v[i] as f64,
        }
    }

    /// Append component `i` as little-endian bytes.
    pub fn write_le(&self, i: usize, out: &mut Vec<u8>) {
        match self {
            AccessorData::F32(v) => out.extend_from_slice(&v[i].to_le_bytes()),
            AccessorData::U32(v) => out.extend_from_slice(&v[i].to_le_bytes()),
            AccessorData::U16(v) => out.extend_from_slice(&v[i].to_le_bytes()),
            AccessorData::U8(v) => out.push(v[i]),
            AccessorData::I16(v) => out.extend_from_slice(&v[i].to_le_bytes()),
            AccessorData::I8(v) => out.extend_from_slice(&v[i].to_le_bytes()),
        }
    }
}

/// Number of components per element for an accessor type.
pub fn components(kind: AccessorType) -> usize {
    match kind {
        AccessorType::Scalar => 1,
        AccessorType::Vec2 => 2,
        AccessorType::Vec3 => 3,
        AccessorType::Vec4 => 4,
        AccessorType::Mat2 => 4,
        AccessorType::Mat3 => 9,
        AccessorType::Mat4 => 16,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub data: AccessorData,
    pub kind: AccessorType,
    pub normalized: bool,
}

impl Accessor {
    pub fn new(data: AccessorData, kind: AccessorType) -> Self {
        Self {
            data,
            kind,
            normalized: false,
        }
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len() / components(self.kind)
    }

    /// Element `i` as floats, dequantizing normalized integers.
    pub fn element_f32(&self, i: usize) -> Vec<f32> {
        let n = components(self.kind);
        (0..n)
            .map(|c| {
                let raw = self.data.get(i * n + c);
                if !self.normalized {
                    return raw as f32;
                }
                let value = match self.data {
                    AccessorData::I8(_) => (raw / 127.0).max(-1.0),
                    AccessorData::U8(_) => raw / 255.0,
                    AccessorData::I16(_) => (raw / 32767.0).max(-1.0),
                    AccessorData::U16(_) => raw / 65535.0,
                    AccessorData::U32(_) => raw / u32::MAX as f64,
                    AccessorData::F32(_) => raw,
                };
                value as f32
            })
            .collect()
    }

    /// All components as floats, dequantizing normalized integers.
    pub fn to_f32(&self) -> Vec<f32> {
        if let (AccessorData::F32(v), false) = (&self.data, self.normalized) {
            return v.clone();
        }
        (0..self.count()).flat_map(|i| self.element_f32(i)).collect()
    }

    /// Per-component minimum and maximum of the raw stored values.
    pub fn bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let n = components(self.kind);
        let count = self.count();
        if count == 0 {
            return None;
        }
        let mut min = vec![f64::MAX; n];
        let mut max = vec![f64::MIN; n];
        for i in 0..count {
            for c in 0..n {
                let v = self.data.get(i * n + c);
                min[c] = min[c].min(v);
                max[c] = max[c].max(v);
            }
        }
        Some((min, max))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub attributes: BTreeMap<Attribute, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: None,
            mesh: None,
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Texture slot on a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRef {
    pub texture: usize,
    pub tex_coord: u32,
}

impl TextureRef {
    pub fn new(texture: usize) -> Self {
        Self {
            texture,
            tex_coord: 0,
        }
    }
}

/// Metallic-roughness material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    /// Linear RGBA.
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub base_color_texture: Option<TextureRef>,
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureRef>,
    pub occlusion_strength: f32,
    pub emissive_texture: Option<TextureRef>,
    pub emissive: [f32; 3],
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 1.0,
            roughness: 1.0,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_texture: None,
            emissive: [0.0, 0.0, 0.0],
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: None,
            double_sided: false,
        }
    }
}

impl Material {
    fn texture_refs_mut(&mut self) -> impl Iterator<Item = &mut TextureRef> {
        [
            &mut self.base_color_texture,
            &mut self.metallic_roughness_texture,
            &mut self.normal_texture,
            &mut self.occlusion_texture,
            &mut self.emissive_texture,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    pub image: usize,
    pub sampler: Option<usize>,
}

/// Encoded image bytes embedded in the binary buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    pub mag_filter: Option<MagFilter>,
    pub min_filter: Option<MinFilter>,
    pub wrap_s: WrappingMode,
    pub wrap_t: WrappingMode,
}

impl Sampler {
    /// Linear filtering, repeat on both axes.
    pub fn repeat() -> Self {
        Self {
            mag_filter: Some(MagFilter::Linear),
            min_filter: Some(MinFilter::LinearMipmapLinear),
            wrap_s: WrappingMode::Repeat,
            wrap_t: WrappingMode::Repeat,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// Index offsets applied to a document appended by [`Document::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOffsets {
    pub nodes: usize,
    pub meshes: usize,
    pub accessors: usize,
    pub materials: usize,
    pub textures: usize,
    pub images: usize,
    pub samplers: usize,
    pub scenes: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub accessors: Vec<Accessor>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
    pub samplers: Vec<Sampler>,
    pub scenes: Vec<Scene>,
    pub default_scene: Option<usize>,
    pub extensions_used: BTreeSet<String>,
    pub extensions_required: BTreeSet<String>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Add `node` as a child of `parent`.
    pub fn add_child(&mut self, parent: usize, node: Node) -> usize {
        let index = self.add_node(node);
        self.nodes[parent].children.push(index);
        index
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_accessor(&mut self, accessor: Accessor) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: Texture) -> usize {
        self.textures.push(texture);
        self.textures.len() - 1
    }

    pub fn add_image(&mut self, image: Image) -> usize {
        self.images.push(image);
        self.images.len() - 1
    }

    pub fn add_sampler(&mut self, sampler: Sampler) -> usize {
        self.samplers.push(sampler);
        self.samplers.len() - 1
    }

    pub fn add_scene(&mut self, scene: Scene) -> usize {
        self.scenes.push(scene);
        self.scenes.len() - 1
    }

    /// Store a triangle mesh as one primitive with position, normal, UV and
    /// index accessors.
    pub fn add_triangle_mesh(
        &mut self,
        name: impl Into<String>,
        mesh: &mesher::Mesh,
        material: Option<usize>,
    ) -> usize {
        let position = self.add_accessor(Accessor::new(
            AccessorData::F32(mesh.positions_flat()),
            AccessorType::Vec3,
        ));
        let normal = self.add_accessor(Accessor::new(
            AccessorData::F32(mesh.normals_flat()),
            AccessorType::Vec3,
        ));
        let uv = self.add_accessor(Accessor::new(
            AccessorData::F32(mesh.uvs_flat()),
            AccessorType::Vec2,
        ));
        let indices = self.add_accessor(Accessor::new(
            AccessorData::U32(mesh.indices.clone()),
            AccessorType::Scalar,
        ));

        let mut attributes = BTreeMap::new();
        attributes.insert(Attribute::Position, position);
        attributes.insert(Attribute::Normal, normal);
        attributes.insert(Attribute::TexCoord(0), uv);

        self.add_mesh(Mesh {
            name: Some(name.into()),
            primitives: vec![Primitive {
                attributes,
                indices: Some(indices),
                material,
                mode: Mode::Triangles,
            }],
        })
    }

    pub fn scene_roots(&self) -> Vec<usize> {
        self.scenes.iter().flat_map(|s| s.nodes.iter().copied()).collect()
    }

    /// Indices of nodes whose name matches exactly.
    pub fn nodes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.name.as_deref() == Some(name))
            .map(|(i, _)| i)
    }

    /// Number of nodes referencing each mesh.
    pub fn mesh_users(&self) -> Vec<usize> {
        let mut users = vec![0; self.meshes.len()];
        for node in &self.nodes {
            if let Some(m) = node.mesh {
                users[m] += 1;
            }
        }
        users
    }

    /// Append `other`, remapping all of its indices. Nothing is shared
    /// between the two documents afterwards.
    pub fn merge(&mut self, other: Document) -> MergeOffsets {
        let offsets = MergeOffsets {
            nodes: self.nodes.len(),
            meshes: self.meshes.len(),
            accessors: self.accessors.len(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            images: self.images.len(),
            samplers: self.samplers.len(),
            scenes: self.scenes.len(),
        };

        self.nodes.extend(other.nodes.into_iter().map(|mut node| {
            node.mesh = node.mesh.map(|m| m + offsets.meshes);
            for child in &mut node.children {
                *child += offsets.nodes;
            }
            node
        }));
        self.meshes.extend(other.meshes.into_iter().map(|mut mesh| {
            for prim in &mut mesh.primitives {
                for accessor in prim.attributes.values_mut() {
                    *accessor += offsets.accessors;
                }
                prim.indices = prim.indices.map(|i| i + offsets.accessors);
                prim.material = prim.material.map(|m| m + offsets.materials);
            }
            mesh
        }));
        self.accessors.extend(other.accessors);
        self.materials.extend(other.materials.into_iter().map(|mut material| {
            for slot in material.texture_refs_mut() {
                slot.texture += offsets.textures;
            }
            material
        }));
        self.textures.extend(other.textures.into_iter().map(|mut texture| {
            texture.image += offsets.images;
            texture.sampler = texture.sampler.map(|s| s + offsets.samplers);
            texture
        }));
        self.images.extend(other.images);
        self.samplers.extend(other.samplers);
        self.scenes.extend(other.scenes.into_iter().map(|mut scene| {
            for node in &mut scene.nodes {
                *node += offsets.nodes;
            }
            scene
        }));
        if self.default_scene.is_none() {
            self.default_scene = other.default_scene.map(|s| s + offsets.scenes);
        }
        self.extensions_used.extend(other.extensions_used);
        self.extensions_required.extend(other.extensions_required);

        offsets
    }

    /// Move every scene's roots into a single default scene.
    pub fn consolidate_scenes(&mut self) {
        let name = self
            .default_scene
            .and_then(|s| self.scenes.get(s))
            .and_then(|s| s.name.clone());
        let mut roots = Vec::new();
        for node in self.scene_roots() {
            if !roots.contains(&node) {
                roots.push(node);
            }
        }
        self.scenes = vec![Scene { name, nodes: roots }];
        self.default_scene = Some(0);
    }

    /// World matrix of every node reachable from the scenes; `None` for
    /// unreachable nodes.
    pub fn world_matrices(&self) -> Vec<Option<Mat4>> {
        let mut world = vec![None; self.nodes.len()];
        let mut stack: Vec<(usize, Mat4)> = self
            .scene_roots()
            .into_iter()
            .map(|n| (n, Mat4::IDENTITY))
            .collect();
        while let Some((index, parent)) = stack.pop() {
            if world[index].is_some() {
                continue;
            }
            let matrix = parent * self.nodes[index].local_matrix();
            world[index] = Some(matrix);
            for &child in &self.nodes[index].children {
                stack.push((child, matrix));
            }
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::Vertex;

    fn triangle_doc(name: &str) -> Document {
        let mut mesh = mesher::Mesh::new();
        let a = mesh.add_vertex(Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]));
        let b = mesh.add_vertex(Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]));
        let c = mesh.add_vertex(Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]));
        mesh.add_triangle(a, b, c);

        let mut doc = Document::new();
        let image = doc.add_image(Image {
            name: None,
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        });
        let sampler = doc.add_sampler(Sampler::repeat());
        let texture = doc.add_texture(Texture {
            name: None,
            image,
            sampler: Some(sampler),
        });
        let material = doc.add_material(Material {
            base_color_texture: Some(TextureRef::new(texture)),
            ..Default::default()
        });
        let m = doc.add_triangle_mesh(name, &mesh, Some(material));
        let root = doc.add_node(Node::new(name).with_mesh(m));
        let scene = doc.add_scene(Scene {
            name: None,
            nodes: vec![root],
        });
        doc.default_scene = Some(scene);
        doc
    }

    #[test]
    fn test_merge_remaps_indices() {
        let mut base = triangle_doc("a");
        let offsets = base.merge(triangle_doc("b"));

        assert_eq!(offsets.accessors, 4);
        assert_eq!(base.nodes.len(), 2);
        assert_eq!(base.nodes[1].mesh, Some(1));
        let prim = &base.meshes[1].primitives[0];
        assert_eq!(prim.attributes[&Attribute::Position], 4);
        assert_eq!(prim.indices, Some(7));
        assert_eq!(prim.material, Some(1));
        assert_eq!(base.materials[1].base_color_texture.unwrap().texture, 1);
        assert_eq!(base.textures[1].image, 1);
        assert_eq!(base.textures[1].sampler, Some(1));
        assert_eq!(base.scenes[1].nodes, vec![1]);
        assert_eq!(base.default_scene, Some(0));
    }

    #[test]
    fn test_consolidate_scenes() {
        let mut base = triangle_doc("a");
        base.merge(triangle_doc("b"));
        base.merge(triangle_doc("c"));
        base.consolidate_scenes();
        assert_eq!(base.scenes.len(), 1);
        assert_eq!(base.scenes[0].nodes, vec![0, 1, 2]);
        assert_eq!(base.default_scene, Some(0));
    }

    #[test]
    fn test_world_matrices() {
        let mut doc = Document::new();
        let root = doc.add_node(Node::new("root").with_translation(Vec3::new(1.0, 0.0, 0.0)));
        let child = doc.add_child(root, Node::new("child").with_scale(Vec3::splat(2.0)));
        doc.add_node(Node::new("orphan"));
        doc.add_scene(Scene {
            name: None,
            nodes: vec![root],
        });

        let world = doc.world_matrices();
        let p = world[child].unwrap().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 0.0, 0.0));
        assert!(world[2].is_none());
    }

    #[test]
    fn test_normalized_accessor_dequantizes() {
        let accessor = Accessor {
            data: AccessorData::I16(vec![32767, -32767, 0]),
            kind: AccessorType::Vec3,
            normalized: true,
        };
        assert_eq!(accessor.to_f32(), vec![1.0, -1.0, 0.0]);
        let (min, max) = accessor.bounds().unwrap();
        assert_eq!(min, vec![32767.0, -32767.0, 0.0]);
        assert_eq!(max, vec![32767.0, -32767.0, 0.0]);
    }
}
