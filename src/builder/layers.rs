use super::BuildContext;
use crate::document::Node;
use crate::geometry::{generate_fillet_path, parse_path_to_polygons, Polygon};
use crate::mesher::flat_surface;
use crate::types::{FloorLayer, GeometryKind};
use glam::{DVec2, Quat, Vec3};

/// Paint order of floor layers: indices stably sorted by `zIndex`.
pub fn layer_order(layers: &[FloorLayer]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..layers.len()).collect();
    order.sort_by_key(|&i| layers[i].z_index);
    order
}

impl BuildContext<'_> {
    /// Add one node per drawable floor layer under the floor group.
    ///
    /// Layer `rank` (its position in paint order) is lifted by
    /// `epsilon * (rank + 1)` above the floor.
    pub(super) fn add_floor_layers(&mut self, floor_group: usize, center: DVec2) {
        let snapshot = self.snapshot;
        let layers = &snapshot.scene.floor_layers;

        for (rank, &index) in layer_order(layers).iter().enumerate() {
            let layer = &layers[index];
            let polygons = match self.layer_polygons(layer) {
                Ok(polygons) => polygons,
                Err(reason) => {
                    self.warn(format!("floor layer {} skipped: {}", describe(layer, index), reason));
                    continue;
                }
            };

            let repeat = match layer.texture.as_ref().and_then(|t| t.scale) {
                Some(scale) if scale > 0.0 => 1.0 / scale,
                _ => 1.0,
            };
            let mesh = flat_surface(&polygons, |p| p, |p| [(p.x * repeat) as f32, (p.y * repeat) as f32]);
            if mesh.is_empty() {
                self.warn(format!(
                    "floor layer {} skipped: outline could not be triangulated",
                    describe(layer, index)
                ));
                continue;
            }

            let material = self.layer_material(layer, rank);
            let mesh = self.doc.add_triangle_mesh(format!("FloorLayer_{}", rank), &mesh, Some(material));

            let kind = match layer.geometry_type {
                GeometryKind::Preset => "preset",
                GeometryKind::Freehand => "freehand",
            };
            let depth = -self.z_fight_epsilon * (rank + 1) as f64;
            let mut node = Node::new(format!("FloorLayer_{}_{}", kind, rank))
                .with_mesh(mesh)
                .with_translation(Vec3::new(
                    (layer.x - center.x) as f32,
                    (layer.z - center.y) as f32,
                    depth as f32,
                ));
            if layer.geometry_type == GeometryKind::Preset {
                node = node.with_scale(Vec3::new(or_one(layer.width), or_one(layer.height), 1.0));
            }
            if layer.rotation != 0.0 {
                node = node.with_rotation(Quat::from_rotation_z((-layer.rotation).to_radians() as f32));
            }
            self.doc.add_child(floor_group, node);
        }
    }

    /// Resolve a layer's outline in layer-local coordinates.
    fn layer_polygons(&self, layer: &FloorLayer) -> Result<Vec<Polygon>, String> {
        match layer.geometry_type {
            GeometryKind::Freehand => {
                if layer.points.len() < 3 {
                    return Err(format!("freehand outline has {} points", layer.points.len()));
                }
                let polygons = generate_fillet_path(&layer.points, true).to_polygons();
                if polygons.is_empty() {
                    return Err("freehand outline is degenerate".to_string());
                }
                Ok(polygons)
            }
            GeometryKind::Preset => {
                let code = layer.shape_id.as_deref().ok_or("no preset shape given")?;
                let shape = self
                    .snapshot
                    .shape(code)
                    .ok_or_else(|| format!("unknown preset shape '{}'", code))?;
                let mut polygons = parse_path_to_polygons(&shape.svg_path);
                let bounds = polygons
                    .iter()
                    .filter_map(Polygon::bounds)
                    .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)));
                let Some((min, max)) = bounds else {
                    return Err(format!("preset shape '{}' has no closed outline", code));
                };
                let offset = -(min + max) * 0.5;
                for polygon in &mut polygons {
                    polygon.translate(offset);
                }
                Ok(polygons)
            }
        }
    }
}

fn or_one(v: f64) -> f32 {
    if v == 0.0 {
        1.0
    } else {
        v as f32
    }
}

fn describe(layer: &FloorLayer, index: usize) -> String {
    match &layer.id {
        Some(id) => format!("'{}'", id),
        None => format!("#{}", index),
    }
}
