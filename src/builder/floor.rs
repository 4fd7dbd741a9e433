use super::{BuildContext, FloorFrame};
use crate::document::Node;
use crate::error::{ExportError, Result};
use crate::geometry::{signed_area, Polygon};
use crate::mesher::flat_surface;
use crate::types::FloorShape;
use glam::{DVec2, Quat};

impl BuildContext<'_> {
    /// Mesh the base floor under a new `FloorGroup` node.
    ///
    /// The outline is re-centred on its bounding box; UVs run from the
    /// bounding box minimum, one repeat per `textureScale` world units.
    pub(super) fn add_floor(&mut self) -> Result<FloorFrame> {
        let snapshot = self.snapshot;
        let scene = &snapshot.scene;
        if scene.floor.is_degenerate() {
            self.warn("floor shape is degenerate, using defaults for its missing extent".to_string());
        }

        let mut outline: Vec<DVec2> = scene.floor.outline().into_iter().map(|p| p.to_dvec2()).collect();
        if !(signed_area(&outline).abs() > 1e-9) {
            self.warn("floor polygon encloses no area, using the default 5x4 rectangle".to_string());
            outline = FloorShape::default().outline().into_iter().map(|p| p.to_dvec2()).collect();
        }
        let polygon = Polygon::new(outline.clone());
        let (min, max) = polygon
            .bounds()
            .ok_or_else(|| ExportError::Export("floor outline is empty".to_string()))?;
        let center = (min + max) * 0.5;
        let repeat = if scene.texture_scale > 0.0 {
            1.0 / scene.texture_scale
        } else {
            1.0
        };

        let mesh = flat_surface(
            &[polygon],
            |p| p - center,
            |p| [((p.x - min.x) * repeat) as f32, ((p.y - min.y) * repeat) as f32],
        );
        if mesh.is_empty() {
            return Err(ExportError::Export("floor outline could not be triangulated".to_string()));
        }

        let material = self.floor_material();
        let mesh = self.doc.add_triangle_mesh("BaseFloor", &mesh, Some(material));

        let group = self
            .doc
            .add_node(Node::new("FloorGroup").with_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)));
        self.doc.add_child(group, Node::new("BaseFloor").with_mesh(mesh));

        Ok(FloorFrame { group, center, outline })
    }
}
