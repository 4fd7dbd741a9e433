//! Triangle mesh generation from plan-view outlines.
//!
//! This module turns geometry engine polygons into vertex/index meshes ready
//! to be stored in a [`Document`](crate::document::Document).

pub mod extrude;
pub mod geometry;
pub mod surface;

pub use extrude::extrude_ring;
pub use geometry::{Mesh, Vertex};
pub use surface::{flat_surface, SURFACE_NORMAL};
