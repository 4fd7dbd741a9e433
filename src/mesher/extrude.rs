//! Ring extrusion for perimeter layers.
//!
//! Rings are built directly in world orientation: plan `(x, z)` maps to
//! `(x, y, z)` with the extrusion along +Y.

use super::geometry::{Mesh, Vertex};
use crate::geometry::{signed_area, triangulate, Polygon};
use glam::DVec2;

const UP: [f32; 3] = [0.0, 1.0, 0.0];
const DOWN: [f32; 3] = [0.0, -1.0, 0.0];

/// Extrude the region between `outer` and `inner` from `y = 0` to `y = height`.
///
/// Produces a top cap, a bottom cap and flat-shaded side walls. Outer walls
/// face away from the ring; inner walls face into the hole. UVs are plan
/// coordinates on the caps and `(distance along ring, height)` on the walls,
/// all multiplied by `uv_scale`. Returns an empty mesh if the caps cannot
/// be triangulated.
pub fn extrude_ring(outer: &[DVec2], inner: &[DVec2], height: f64, uv_scale: f64) -> Mesh {
    let mut mesh = Mesh::new();
    if outer.len() < 3 {
        return mesh;
    }

    let mut cap = Polygon::new(outer.to_vec());
    if inner.len() >= 3 {
        cap = cap.with_hole(inner.to_vec());
    }
    let cap_indices = triangulate(&cap);
    if cap_indices.is_empty() {
        return mesh;
    }

    let scale = uv_scale as f32;
    let top = height as f32;

    for (y, normal) in [(top, UP), (0.0, DOWN)] {
        let base = mesh.vertex_count() as u32;
        for p in cap.points() {
            mesh.add_vertex(Vertex::new(
                [p.x as f32, y, p.y as f32],
                normal,
                [p.x as f32 * scale, p.y as f32 * scale],
            ));
        }
        for tri in cap_indices.chunks_exact(3) {
            mesh.add_triangle_facing(base + tri[0], base + tri[1], base + tri[2], normal);
        }
    }

    add_walls(&mut mesh, outer, top, scale, 1.0);
    if inner.len() >= 3 {
        add_walls(&mut mesh, inner, top, scale, -1.0);
    }

    mesh
}

/// Side walls along a ring. `side` is 1.0 for normals pointing away from the
/// ring's interior, -1.0 for normals pointing into it.
fn add_walls(mesh: &mut Mesh, ring: &[DVec2], height: f32, scale: f32, side: f64) {
    let orientation = if signed_area(ring) >= 0.0 { 1.0 } else { -1.0 };
    let n = ring.len();
    let mut run = 0.0f32;

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let edge = b - a;
        let length = edge.length() as f32;
        if length < 1e-9 {
            continue;
        }
        let dir = edge.normalize();
        let out = DVec2::new(dir.y, -dir.x) * orientation * side;
        let normal = [out.x as f32, 0.0, out.y as f32];

        let u0 = run * scale;
        let u1 = (run + length) * scale;
        let v1 = height * scale;
        let i0 = mesh.add_vertex(Vertex::new([a.x as f32, 0.0, a.y as f32], normal, [u0, 0.0]));
        let i1 = mesh.add_vertex(Vertex::new([b.x as f32, 0.0, b.y as f32], normal, [u1, 0.0]));
        let i2 = mesh.add_vertex(Vertex::new([b.x as f32, height, b.y as f32], normal, [u1, v1]));
        let i3 = mesh.add_vertex(Vertex::new([a.x as f32, height, a.y as f32], normal, [u0, v1]));
        mesh.add_quad_facing(i0, i1, i2, i3, normal);

        run += length;
    }
}
