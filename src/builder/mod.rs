//! Scene document builder.
//!
//! Turns a [`SceneSnapshot`] into a [`Document`] holding the floor, the
//! painted floor layers and the perimeter rings. Model instances are not
//! added here; they are merged in afterwards by
//! [`ModelMerger`](crate::merge::ModelMerger).
//!
//! Node layout:
//!
//! ```text
//! Scene
//! ├── FloorGroup            (rotated +90° about X: local XY → world XZ)
//! │   ├── BaseFloor
//! │   └── FloorLayer_{kind}_{rank}...
//! └── PerimeterGroup        (translated by -floor centre)
//!     └── Perimeter_{kind}_{index}...
//! ```
//!
//! Recoverable problems (bad layer outlines, missing textures) are collected
//! as warnings and the offending piece is skipped or drawn flat.

mod floor;
mod layers;
mod materials;
mod perimeter;

pub use layers::layer_order;

use crate::document::{Document, Scene};
use crate::error::Result;
use crate::source::TextureSource;
use crate::types::SceneSnapshot;
use glam::DVec2;
use std::collections::HashMap;

/// Depth step between consecutive floor layers.
pub const DEFAULT_Z_FIGHT_EPSILON: f64 = 0.001;

/// Output of [`SceneBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltScene {
    pub document: Document,
    pub warnings: Vec<String>,
}

/// Builds the parametric part of a scene.
pub struct SceneBuilder<'a> {
    snapshot: &'a SceneSnapshot,
    textures: &'a dyn TextureSource,
    z_fight_epsilon: f64,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(snapshot: &'a SceneSnapshot, textures: &'a dyn TextureSource) -> Self {
        Self {
            snapshot,
            textures,
            z_fight_epsilon: DEFAULT_Z_FIGHT_EPSILON,
        }
    }

    pub fn with_z_fight_epsilon(mut self, epsilon: f64) -> Self {
        self.z_fight_epsilon = epsilon;
        self
    }

    /// Build the floor, floor layers and perimeter into a fresh document.
    ///
    /// Fails only when the base floor itself cannot be meshed.
    pub fn build(self) -> Result<BuiltScene> {
        let scene = &self.snapshot.scene;
        let mut ctx = BuildContext {
            snapshot: self.snapshot,
            textures: self.textures,
            z_fight_epsilon: self.z_fight_epsilon,
            doc: Document::new(),
            warnings: Vec::new(),
            texture_cache: HashMap::new(),
            packed_maps: HashMap::new(),
            sampler: None,
        };

        let floor = ctx.add_floor()?;
        let mut roots = vec![floor.group];

        ctx.add_floor_layers(floor.group, floor.center);

        if let Some(group) = ctx.add_perimeter(&floor.outline, floor.center) {
            roots.push(group);
        }

        ctx.doc.add_scene(Scene {
            name: Some(scene.name.clone().unwrap_or_else(|| "Scene".to_string())),
            nodes: roots,
        });
        ctx.doc.default_scene = Some(0);

        tracing::debug!(
            nodes = ctx.doc.nodes.len(),
            meshes = ctx.doc.meshes.len(),
            warnings = ctx.warnings.len(),
            "scene document built"
        );

        Ok(BuiltScene {
            document: ctx.doc,
            warnings: ctx.warnings,
        })
    }
}

/// Base floor placement shared by layers and perimeter.
pub(crate) struct FloorFrame {
    pub group: usize,
    /// Bounding box centre of the floor outline in plan coordinates.
    pub center: DVec2,
    pub outline: Vec<DVec2>,
}

/// Mutable state threaded through the build steps.
pub(crate) struct BuildContext<'a> {
    snapshot: &'a SceneSnapshot,
    textures: &'a dyn TextureSource,
    z_fight_epsilon: f64,
    doc: Document,
    warnings: Vec<String>,
    /// URL to texture index; `None` records a failed load.
    texture_cache: HashMap<String, Option<usize>>,
    packed_maps: HashMap<String, Option<usize>>,
    sampler: Option<usize>,
}

impl BuildContext<'_> {
    fn warn(&mut self, message: String) {
        tracing::warn!(stage = "build", "{}", message);
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Attribute;
    use crate::source::TextureData;
    use crate::types::{
        FilletKind, FloorLayer, FloorShape, GeometryKind, LayerPoint, PerimeterLayer, Point2, ShapeRecord,
    };
    use glam::Vec3;

    pub(super) struct NoTextures;

    impl TextureSource for NoTextures {
        fn load(&self, _url: &str) -> Option<TextureData> {
            None
        }
    }

    fn rectangle_snapshot() -> SceneSnapshot {
        let mut snapshot = SceneSnapshot::default();
        snapshot.scene.floor = FloorShape::Rectangle { width: 4.0, depth: 3.0 };
        snapshot
    }

    fn node(doc: &Document, name: &str) -> usize {
        doc.nodes_named(name).next().unwrap_or_else(|| panic!("node {} missing", name))
    }

    /// World-space bounds of a node's mesh positions.
    fn world_bounds(doc: &Document, node_index: usize) -> (Vec3, Vec3) {
        let world = doc.world_matrices()[node_index].unwrap();
        let mesh = &doc.meshes[doc.nodes[node_index].mesh.unwrap()];
        let positions = doc.accessors[mesh.primitives[0].attributes[&Attribute::Position]].to_f32();
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in positions.chunks_exact(3) {
            let w = world.transform_point3(Vec3::new(p[0], p[1], p[2]));
            min = min.min(w);
            max = max.max(w);
        }
        (min, max)
    }

    fn assert_vec_near(a: Vec3, b: Vec3) {
        assert!((a - b).abs().max_element() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_rectangle_floor_with_wall() {
        let mut snapshot = rectangle_snapshot();
        snapshot.scene.perimeter_layers.push(PerimeterLayer {
            kind: Some("wall".into()),
            width: 0.3,
            height: Some(1.0),
            ..Default::default()
        });

        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        let doc = &built.document;
        assert!(built.warnings.is_empty());
        assert_eq!(doc.scenes.len(), 1);
        assert_eq!(doc.scenes[0].nodes.len(), 2);

        let (min, max) = world_bounds(doc, node(doc, "BaseFloor"));
        assert_vec_near(min, Vec3::new(-2.0, 0.0, -1.5));
        assert_vec_near(max, Vec3::new(2.0, 0.0, 1.5));

        let (min, max) = world_bounds(doc, node(doc, "Perimeter_wall_0"));
        assert_vec_near(min, Vec3::new(-2.3, 0.0, -1.8));
        assert_vec_near(max, Vec3::new(2.3, 1.0, 1.8));

        // Floor faces up once placed in the world.
        let floor = node(doc, "BaseFloor");
        let world = doc.world_matrices()[floor].unwrap();
        let mesh = &doc.meshes[doc.nodes[floor].mesh.unwrap()];
        let normals = doc.accessors[mesh.primitives[0].attributes[&Attribute::Normal]].to_f32();
        let up = world.transform_vector3(Vec3::new(normals[0], normals[1], normals[2]));
        assert_vec_near(up, Vec3::Y);
    }

    #[test]
    fn test_concentric_perimeter_rings() {
        let mut snapshot = rectangle_snapshot();
        for (kind, width) in [("wall", 0.3), ("sidewalk", 1.0)] {
            snapshot.scene.perimeter_layers.push(PerimeterLayer {
                kind: Some(kind.into()),
                width,
                elevation: 0.5,
                ..Default::default()
            });
        }
        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        let doc = &built.document;

        let (min, max) = world_bounds(doc, node(doc, "Perimeter_sidewalk_1"));
        assert_vec_near(min, Vec3::new(-3.3, 0.5, -2.8));
        assert_vec_near(max, Vec3::new(3.3, 0.6, 2.8));
    }

    #[test]
    fn test_freehand_filleted_layer() {
        let mut snapshot = rectangle_snapshot();
        let corner = |x, z| LayerPoint::new(x, z).with_fillet(0.2, FilletKind::Round);
        snapshot.scene.floor_layers.push(FloorLayer {
            geometry_type: GeometryKind::Freehand,
            points: vec![corner(0.0, 0.0), corner(1.0, 0.0), corner(1.0, 1.0), corner(0.0, 1.0)],
            x: 2.0,
            z: 1.5,
            ..Default::default()
        });

        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        let doc = &built.document;
        let layer = node(doc, "FloorLayer_freehand_0");
        let mesh = &doc.meshes[doc.nodes[layer].mesh.unwrap()];
        let positions = doc.accessors[mesh.primitives[0].attributes[&Attribute::Position]].to_f32();

        assert!(positions.len() / 3 > 4);
        for p in positions.chunks_exact(3) {
            for (cx, cy) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let d = ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt();
                assert!(d > 0.05, "vertex {:?} too close to corner", p);
            }
        }
        // Layer sits at its plan position relative to the floor centre.
        assert_eq!(doc.nodes[layer].translation.x, 0.0);
        assert_eq!(doc.nodes[layer].translation.y, 0.0);
        assert_eq!(doc.nodes[layer].scale, Vec3::ONE);
    }

    #[test]
    fn test_layer_stacking_follows_z_index() {
        let mut snapshot = rectangle_snapshot();
        snapshot.shapes.push(ShapeRecord {
            code: "square".into(),
            name: None,
            svg_path: "M0 0 L2 0 L2 2 L0 2 Z".into(),
        });
        for z_index in [5, 1, 3, 1] {
            snapshot.scene.floor_layers.push(FloorLayer {
                shape_id: Some("square".into()),
                x: 2.0,
                z: 1.5,
                z_index,
                width: 2.0,
                height: 0.5,
                rotation: 90.0,
                ..Default::default()
            });
        }

        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        let doc = &built.document;
        let depths: Vec<f32> = (0..4)
            .map(|rank| doc.nodes[node(doc, &format!("FloorLayer_preset_{}", rank))].translation.z)
            .collect();
        for pair in depths.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!((depths[0] + 0.001).abs() < 1e-7);

        let first = &doc.nodes[node(doc, "FloorLayer_preset_0")];
        assert_eq!(first.scale, Vec3::new(2.0, 0.5, 1.0));
        let turned = first.rotation * Vec3::X;
        assert_vec_near(turned, Vec3::new(0.0, -1.0, 0.0));

        // Preset outlines are centred on their own bounds.
        let (min, max) = world_bounds(doc, node(doc, "FloorLayer_preset_0"));
        assert!((min.x + max.x).abs() < 1e-4);
        assert!((min.z + max.z).abs() < 1e-4);
    }

    #[test]
    fn test_unknown_preset_is_skipped_with_warning() {
        let mut snapshot = rectangle_snapshot();
        snapshot.scene.floor_layers.push(FloorLayer {
            shape_id: Some("missing".into()),
            ..Default::default()
        });
        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        assert_eq!(built.warnings.len(), 1);
        assert!(built.warnings[0].contains("missing"));
        assert_eq!(built.document.nodes_named("FloorLayer_preset_0").count(), 0);
    }

    #[test]
    fn test_degenerate_polygon_floor_falls_back() {
        let mut snapshot = SceneSnapshot::default();
        snapshot.scene.floor = FloorShape::Polygon { points: vec![] };
        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        assert_eq!(built.warnings.len(), 1);
        let doc = &built.document;
        let (min, max) = world_bounds(doc, node(doc, "BaseFloor"));
        assert_vec_near(max - min, Vec3::new(5.0, 0.0, 4.0));
    }

    #[test]
    fn test_zero_width_rectangle_uses_default_width() {
        let mut snapshot = SceneSnapshot::default();
        snapshot.scene.floor = FloorShape::Rectangle { width: 0.0, depth: 3.0 };
        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        assert_eq!(built.warnings.len(), 1);
        let doc = &built.document;
        let (min, max) = world_bounds(doc, node(doc, "BaseFloor"));
        assert_vec_near(max - min, Vec3::new(5.0, 0.0, 3.0));
    }

    #[test]
    fn test_collinear_polygon_floor_falls_back() {
        let mut snapshot = SceneSnapshot::default();
        snapshot.scene.floor = FloorShape::Polygon {
            points: vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)],
        };
        let built = SceneBuilder::new(&snapshot, &NoTextures).build().unwrap();
        assert!(built.warnings[0].contains("no area"));
        let doc = &built.document;
        let (min, max) = world_bounds(doc, node(doc, "BaseFloor"));
        assert_vec_near(max - min, Vec3::new(5.0, 0.0, 4.0));
    }
}
