//! Miter-join polygon offsetting.

use super::{signed_area, EDGE_EPSILON};
use glam::DVec2;

const BISECTOR_EPSILON: f64 = 1e-6;
const COS_EPSILON: f64 = 1e-4;

/// Offset a closed ring by `distance`.
///
/// Positive distances grow the ring outward whatever its winding. Each vertex
/// moves along the bisector of its two edge normals by `distance / cos(half-angle)`,
/// so parallel edges end up exactly `distance` away from the originals.
/// Returns an empty ring for fewer than three points.
pub fn offset_polygon(points: &[DVec2], distance: f64) -> Vec<DVec2> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    // Right-hand normals point outward on a counter-clockwise ring.
    let orientation = if signed_area(points) >= 0.0 { 1.0 } else { -1.0 };
    let outward = |edge: DVec2| DVec2::new(edge.y, -edge.x) * orientation;

    let mut result = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let curr = points[i];
        let next = points[(i + 1) % n];

        let incoming = curr - prev;
        let outgoing = next - curr;
        if incoming.length() < EDGE_EPSILON || outgoing.length() < EDGE_EPSILON {
            result.push(curr);
            continue;
        }

        let norm1 = outward(incoming.normalize());
        let norm2 = outward(outgoing.normalize());

        let sum = norm1 + norm2;
        let bisector = if sum.length() < BISECTOR_EPSILON {
            norm1
        } else {
            sum.normalize()
        };

        let cos_half = norm1.dot(bisector);
        let length = if cos_half.abs() > COS_EPSILON {
            distance / cos_half
        } else {
            distance
        };

        result.push(curr + bisector * length);
    }

    result
}
