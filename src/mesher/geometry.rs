//! Triangle mesh buffers produced by the surface and extrusion meshers.

use crate::types::BoundingBox;
use glam::Vec3;

/// One mesh vertex: position, shading normal and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

/// Indexed triangle list. Indices come in groups of three.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex, returning its index.
    pub fn add_vertex(&mut self, vertex: Vertex) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Add a triangle wound counter-clockwise when seen from `facing`.
    pub fn add_triangle_facing(&mut self, a: u32, b: u32, c: u32, facing: [f32; 3]) {
        let [pa, pb, pc] = [a, b, c].map(|i| Vec3::from(self.vertices[i as usize].position));
        if (pb - pa).cross(pc - pa).dot(Vec3::from(facing)) < 0.0 {
            self.add_triangle(a, c, b);
        } else {
            self.add_triangle(a, b, c);
        }
    }

    /// Two triangles over the corners `a b c d`, taken in order around the quad.
    pub fn add_quad_facing(&mut self, a: u32, b: u32, c: u32, d: u32, facing: [f32; 3]) {
        self.add_triangle_facing(a, b, c, facing);
        self.add_triangle_facing(a, c, d, facing);
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// A mesh without a single triangle.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices.iter().map(|v| v.position))
    }

    pub fn positions_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.position).collect()
    }

    pub fn normals_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.normal).collect()
    }

    pub fn uvs_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.uv).collect()
    }
}
