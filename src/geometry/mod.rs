//! Pure 2D geometry used to build floor, layer and perimeter outlines.
//!
//! Everything here works in the floor plane on `glam::DVec2`, where `x` maps
//! to scene X and `y` maps to scene Z. Malformed input yields empty output
//! rather than an error.

mod contour;
mod fillet;
mod offset;
mod path;
mod triangulate;

pub use contour::{point_in_ring, resolve_contours, signed_area, Polygon};
pub use fillet::{fillet_corner, generate_fillet_path, CornerCut};
pub use offset::offset_polygon;
pub use path::{arc_to_cubics, parse_path, parse_path_to_polygons, Path, PathCommand, PathParseError, CURVE_SEGMENTS};
pub use triangulate::triangulate;

/// Length below which an edge is treated as degenerate.
pub const EDGE_EPSILON: f64 = 1e-6;
