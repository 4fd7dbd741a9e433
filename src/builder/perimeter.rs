use super::BuildContext;
use crate::document::Node;
use crate::geometry::offset_polygon;
use crate::mesher::extrude_ring;
use glam::{DVec2, Vec3};

impl BuildContext<'_> {
    /// Extrude the perimeter layers as concentric rings around `outline`.
    ///
    /// Each layer's outer boundary becomes the next layer's inner boundary.
    /// Returns the `PerimeterGroup` node, or `None` when there are no layers.
    pub(super) fn add_perimeter(&mut self, outline: &[DVec2], center: DVec2) -> Option<usize> {
        let snapshot = self.snapshot;
        let layers = &snapshot.scene.perimeter_layers;
        if layers.is_empty() {
            return None;
        }

        let group = self.doc.add_node(
            Node::new("PerimeterGroup").with_translation(Vec3::new(-center.x as f32, 0.0, -center.y as f32)),
        );

        let mut inner = outline.to_vec();
        for (index, layer) in layers.iter().enumerate() {
            if layer.width.is_nan() || layer.width <= 0.0 {
                self.warn(format!("perimeter layer {} skipped: width must be positive", index));
                continue;
            }
            let outer = offset_polygon(&inner, layer.width);
            if outer.len() < 3 {
                self.warn(format!("perimeter layer {} skipped: offset ring is degenerate", index));
                continue;
            }

            let uv_scale = if layer.is_textured() {
                layer.texture_scale.unwrap_or(1.0) * 0.5
            } else {
                1.0
            };
            let mesh = extrude_ring(&outer, &inner, layer.extrusion_height(), uv_scale);
            if mesh.is_empty() {
                self.warn(format!("perimeter layer {} skipped: ring could not be triangulated", index));
                continue;
            }

            let material = self.perimeter_material(layer);
            let mesh = self.doc.add_triangle_mesh(format!("Perimeter_{}", index), &mesh, Some(material));
            self.doc.add_child(
                group,
                Node::new(format!("Perimeter_{}_{}", layer.kind_name(), index))
                    .with_mesh(mesh)
                    .with_translation(Vec3::new(0.0, layer.elevation as f32, 0.0)),
            );

            inner = outer;
        }

        Some(group)
    }
}
