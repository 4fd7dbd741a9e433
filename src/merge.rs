//! Model merge stage.
//!
//! Each scene item is loaded as its own document, gets its material
//! overrides and placement applied, and is then appended to the scene
//! document. A failing item never fails the export; it is reported and
//! skipped.

use crate::document::{Document, Material, Node, Scene};
use crate::error::{ExportError, Result};
use crate::import::read_glb;
use crate::source::ModelSource;
use crate::types::{hex_to_linear, MaterialOverride, SceneItem, SceneSnapshot};
use glam::{Quat, Vec3};
use std::collections::HashMap;

/// Outcome of merging a scene's items.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Places model instances into a scene document.
pub struct ModelMerger<'a> {
    models: &'a dyn ModelSource,
}

impl<'a> ModelMerger<'a> {
    pub fn new(models: &'a dyn ModelSource) -> Self {
        Self { models }
    }

    /// Merge every item of `snapshot` into `base`, then collapse all scenes
    /// into one default scene. `progress` is called with `(done, total)`
    /// after each item.
    pub fn merge_items<F>(&self, base: &mut Document, snapshot: &SceneSnapshot, mut progress: F) -> MergeReport
    where
        F: FnMut(usize, usize),
    {
        let items = &snapshot.scene.items;
        let mut report = MergeReport::default();

        for (done, item) in items.iter().enumerate() {
            match self.load_item(item, snapshot) {
                Ok(doc) => {
                    base.merge(doc);
                    report.merged += 1;
                    tracing::debug!(item = %item.id, model = %item.model_id, "item merged");
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "item skipped");
                    report.warnings.push(format!("item {} skipped: {}", item.id, e));
                    report.skipped += 1;
                }
            }
            progress(done + 1, items.len());
        }

        base.consolidate_scenes();
        report
    }

    /// Load one item's model as a standalone, placed document.
    pub fn load_item(&self, item: &SceneItem, snapshot: &SceneSnapshot) -> Result<Document> {
        let model = snapshot
            .models
            .get(&item.model_id)
            .ok_or_else(|| ExportError::MissingResource(format!("model {} has no file record", item.model_id)))?;
        let bytes = self
            .models
            .load(model)?
            .ok_or_else(|| ExportError::MissingResource(format!("model file {} not found", model.file_path)))?;

        let mut doc = read_glb(&bytes).map_err(|e| match e {
            ExportError::CompressedGeometry(m) => ExportError::CompressedGeometry(format!("model {}: {}", item.model_id, m)),
            other => ExportError::ModelLoad(format!("model {}: {}", item.model_id, other)),
        })?;
        apply_material_overrides(&mut doc, &item.material_config);
        wrap_item(&mut doc, item);
        Ok(doc)
    }
}

/// Apply per-node material overrides. Returns the number of primitives changed.
///
/// Overrides are keyed by node name (mesh name for unnamed nodes). Materials
/// are cloned before they are changed, and so are meshes used by more than
/// one node, so nothing outside the named node is affected.
pub fn apply_material_overrides(doc: &mut Document, overrides: &HashMap<String, MaterialOverride>) -> usize {
    if overrides.is_empty() {
        return 0;
    }

    let mut users = doc.mesh_users();
    let mut changed = 0;

    for node_index in 0..doc.nodes.len() {
        let Some(mesh_index) = doc.nodes[node_index].mesh else {
            continue;
        };
        let name = doc.nodes[node_index]
            .name
            .clone()
            .or_else(|| doc.meshes.get(mesh_index).and_then(|m| m.name.clone()));
        let Some(config) = name.as_deref().and_then(|n| overrides.get(n)) else {
            continue;
        };
        if mesh_index >= doc.meshes.len() {
            continue;
        }

        let mesh_index = if users[mesh_index] > 1 {
            users[mesh_index] -= 1;
            let copy = doc.meshes[mesh_index].clone();
            let copy = doc.add_mesh(copy);
            users.push(1);
            doc.nodes[node_index].mesh = Some(copy);
            copy
        } else {
            mesh_index
        };

        for p in 0..doc.meshes[mesh_index].primitives.len() {
            let Some(material) = doc.meshes[mesh_index].primitives[p].material else {
                continue;
            };
            let Some(original) = doc.materials.get(material) else {
                continue;
            };
            let mut clone = original.clone();
            apply_override(&mut clone, config);
            let clone = doc.add_material(clone);
            doc.meshes[mesh_index].primitives[p].material = Some(clone);
            changed += 1;
        }
    }

    changed
}

fn apply_override(material: &mut Material, config: &MaterialOverride) {
    if let Some(rgb) = config.color.as_deref().and_then(hex_to_linear) {
        material.base_color = [rgb[0], rgb[1], rgb[2], 1.0];
    }
    if let Some(metalness) = config.metalness {
        material.metallic = metalness;
    }
    if let Some(roughness) = config.roughness {
        material.roughness = roughness;
    }
}

/// Re-parent the model's scene roots under an `Item_{id}` node carrying the
/// item's placement. Returns the wrapper node.
pub fn wrap_item(doc: &mut Document, item: &SceneItem) -> usize {
    let roots = match doc.default_scene.and_then(|s| doc.scenes.get(s)) {
        Some(scene) => scene.nodes.clone(),
        None => doc.scene_roots(),
    };
    let transform = item.transform();

    let mut wrapper = Node::new(format!("Item_{}", item.id))
        .with_translation(Vec3::from(transform.translation))
        .with_rotation(Quat::from_array(transform.rotation))
        .with_scale(Vec3::from(transform.scale));
    wrapper.children = roots;
    let wrapper = doc.add_node(wrapper);

    doc.scenes = vec![Scene {
        name: None,
        nodes: vec![wrapper],
    }];
    doc.default_scene = Some(0);
    wrapper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Attribute;
    use crate::export::write_glb;
    use crate::mesher::{Mesh, Vertex};
    use crate::types::{ModelFile, Vector3};

    fn model_document() -> Document {
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]));
        let b = mesh.add_vertex(Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]));
        let c = mesh.add_vertex(Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]));
        mesh.add_triangle(a, b, c);

        let mut doc = Document::new();
        let material = doc.add_material(Material {
            name: Some("Fabric".into()),
            ..Default::default()
        });
        let m = doc.add_triangle_mesh("Cushion", &mesh, Some(material));
        let root = doc.add_node(Node::new("Chair"));
        doc.add_child(root, Node::new("Seat").with_mesh(m));
        doc.add_child(root, Node::new("Back").with_mesh(m));
        doc.add_scene(Scene {
            name: None,
            nodes: vec![root],
        });
        doc.default_scene = Some(0);
        doc
    }

    struct MemoryModels(HashMap<String, Vec<u8>>);

    impl ModelSource for MemoryModels {
        fn load(&self, model: &ModelFile) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(&model.file_path).cloned())
        }
    }

    fn snapshot_with(items: Vec<SceneItem>) -> SceneSnapshot {
        let mut snapshot = SceneSnapshot::default();
        for id in ["chair", "lost"] {
            snapshot.models.insert(
                id.to_string(),
                ModelFile {
                    file_name: None,
                    file_path: format!("{}.glb", id),
                    iv: None,
                    auth_tag: None,
                },
            );
        }
        snapshot.scene.items = items;
        snapshot
    }

    fn models() -> MemoryModels {
        let mut files = HashMap::new();
        files.insert("chair.glb".to_string(), write_glb(&model_document()).unwrap());
        MemoryModels(files)
    }

    #[test]
    fn test_override_clones_shared_mesh_and_material() {
        let mut doc = model_document();
        let mut overrides = HashMap::new();
        overrides.insert(
            "Seat".to_string(),
            MaterialOverride {
                color: Some("#ff0000".into()),
                metalness: Some(0.0),
                roughness: None,
            },
        );

        assert_eq!(apply_material_overrides(&mut doc, &overrides), 1);

        let seat = doc.nodes_named("Seat").next().unwrap();
        let back = doc.nodes_named("Back").next().unwrap();
        let seat_mesh = doc.nodes[seat].mesh.unwrap();
        let back_mesh = doc.nodes[back].mesh.unwrap();
        assert_ne!(seat_mesh, back_mesh);

        let seat_material = &doc.materials[doc.meshes[seat_mesh].primitives[0].material.unwrap()];
        let back_material = &doc.materials[doc.meshes[back_mesh].primitives[0].material.unwrap()];
        assert_eq!(seat_material.base_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(seat_material.metallic, 0.0);
        assert_eq!(seat_material.roughness, 1.0);
        assert_eq!(back_material.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(back_material.metallic, 1.0);
    }

    #[test]
    fn test_wrap_item_applies_placement() {
        let mut doc = model_document();
        let mut item = SceneItem::new("42", "chair");
        item.position = Vector3::new(1.0, 0.0, 2.0);
        item.rotation = Vector3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0);
        item.scale = Vector3::new(2.0, 2.0, 2.0);

        let wrapper = wrap_item(&mut doc, &item);
        assert_eq!(doc.nodes[wrapper].name.as_deref(), Some("Item_42"));
        assert_eq!(doc.scenes[0].nodes, vec![wrapper]);

        let world = doc.world_matrices();
        let seat = doc.nodes_named("Seat").next().unwrap();
        let p = world[seat].unwrap().transform_point3(Vec3::X);
        // +X rotated a quarter turn about Y becomes -Z, then scaled and moved.
        assert!((p - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_merge_items_skips_missing_models() {
        let snapshot = snapshot_with(vec![
            SceneItem::new("a", "chair"),
            SceneItem::new("b", "lost"),
            SceneItem::new("c", "unknown"),
            SceneItem::new("d", "chair"),
        ]);
        let models = models();
        let mut base = model_document();
        let mut calls = Vec::new();

        let report = ModelMerger::new(&models).merge_items(&mut base, &snapshot, |done, total| calls.push((done, total)));

        assert_eq!(report.merged, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("item b"));
        assert_eq!(calls, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);

        assert_eq!(base.scenes.len(), 1);
        assert_eq!(base.scenes[0].nodes.len(), 3);
        assert_eq!(base.nodes_named("Item_a").count(), 1);
        assert_eq!(base.nodes_named("Item_d").count(), 1);

        // Every merged primitive still points at its own data.
        for mesh in &base.meshes {
            let position = mesh.primitives[0].attributes[&Attribute::Position];
            assert_eq!(base.accessors[position].count(), 3);
        }
    }

    #[test]
    fn test_draco_only_model_skips_item_with_warning() {
        let draco = r#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["KHR_draco_mesh_compression"],
            "extensionsRequired": ["KHR_draco_mesh_compression"],
            "accessors": [{"componentType": 5126, "count": 3, "type": "VEC3"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "nodes": [{"mesh": 0}],
            "scenes": [{"nodes": [0]}]
        }"#;
        let mut files = HashMap::new();
        files.insert("chair.glb".to_string(), crate::export::assemble_glb(draco.as_bytes(), &[]));
        let models = MemoryModels(files);
        let snapshot = snapshot_with(vec![SceneItem::new("sofa-1", "chair")]);
        let mut base = Document::new();

        let report = ModelMerger::new(&models).merge_items(&mut base, &snapshot, |_, _| {});

        assert_eq!((report.merged, report.skipped), (0, 1));
        assert_eq!(
            report.warnings,
            vec!["item sofa-1 skipped: Compressed geometry: model chair: mesh 0 stores its vertices only as KHR_draco_mesh_compression"]
        );
        assert!(base.meshes.is_empty());
    }

    #[test]
    fn test_corrupt_model_is_reported() {
        let snapshot = snapshot_with(vec![SceneItem::new("x", "chair")]);
        let mut files = HashMap::new();
        files.insert("chair.glb".to_string(), b"not a model".to_vec());
        let models = MemoryModels(files);

        let err = ModelMerger::new(&models).load_item(&snapshot.scene.items[0], &snapshot).unwrap_err();
        assert!(matches!(err, ExportError::ModelLoad(_)));
    }
}
