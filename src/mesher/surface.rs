//! Flat triangulated surfaces.

use super::geometry::{Mesh, Vertex};
use crate::geometry::{triangulate, Polygon};
use glam::DVec2;

/// Normal of plan-view surfaces in their local XY frame.
///
/// Floor groups rotate local XY onto world XZ with +90° about X, which maps
/// local -Z onto world +Y.
pub const SURFACE_NORMAL: [f32; 3] = [0.0, 0.0, -1.0];

/// Triangulate polygons into a flat mesh in the local XY plane.
///
/// `position` maps a plan point to its local XY coordinate and `uv` to its
/// texture coordinate. Polygons that fail to triangulate are skipped.
pub fn flat_surface<P, U>(polygons: &[Polygon], position: P, uv: U) -> Mesh
where
    P: Fn(DVec2) -> DVec2,
    U: Fn(DVec2) -> [f32; 2],
{
    let mut mesh = Mesh::new();
    for polygon in polygons {
        let indices = triangulate(polygon);
        if indices.is_empty() {
            continue;
        }

        let base = mesh.vertex_count() as u32;
        for p in polygon.points() {
            let local = position(p);
            mesh.add_vertex(Vertex::new(
                [local.x as f32, local.y as f32, 0.0],
                SURFACE_NORMAL,
                uv(p),
            ));
        }
        for tri in indices.chunks_exact(3) {
            mesh.add_triangle_facing(base + tri[0], base + tri[1], base + tri[2], SURFACE_NORMAL);
        }
    }
    mesh
}
