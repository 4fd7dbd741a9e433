//! Corner rounding and chamfering for freehand outlines.

use super::{Path, EDGE_EPSILON};
use crate::types::{FilletKind, LayerPoint};
use glam::DVec2;
use std::f64::consts::PI;

/// Corners within this many radians of straight or folded are left sharp.
const ANGLE_EPSILON: f64 = 0.01;

/// Result of cutting one corner.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerCut {
    /// Replacement points, in path order.
    pub points: Vec<DVec2>,
    /// Radius after clamping against the adjacent edges.
    pub radius: f64,
    /// Distance from the corner to each tangent point.
    pub tangent: f64,
}

/// Cut the corner at `curr` between `prev` and `next`.
///
/// Returns `None` when the corner should stay sharp: non-positive radius,
/// degenerate edges, or an angle within [`ANGLE_EPSILON`] of 0 or π. The radius
/// is clamped so the tangent points never consume more than 90% of either
/// adjacent edge, and the result is always smaller than the shorter edge.
pub fn fillet_corner(
    prev: DVec2,
    curr: DVec2,
    next: DVec2,
    radius: f64,
    kind: FilletKind,
) -> Option<CornerCut> {
    if radius <= 0.0 {
        return None;
    }

    let v1 = prev - curr;
    let v2 = next - curr;
    let len1 = v1.length();
    let len2 = v2.length();
    if len1 < EDGE_EPSILON || len2 < EDGE_EPSILON {
        return None;
    }
    let d1 = v1 / len1;
    let d2 = v2 / len2;

    let angle = d1.dot(d2).clamp(-1.0, 1.0).acos();
    if angle < ANGLE_EPSILON || angle > PI - ANGLE_EPSILON {
        return None;
    }

    let half_tan = (angle / 2.0).tan();
    let shorter = len1.min(len2);
    let mut r = radius;
    let mut tangent = r / half_tan;
    if tangent > 0.9 * shorter || r >= shorter {
        r = 0.4 * shorter;
        tangent = r / half_tan;
        if tangent > 0.9 * shorter {
            tangent = 0.4 * shorter;
            r = tangent * half_tan;
        }
    }

    let t1 = curr + d1 * tangent;
    let t2 = curr + d2 * tangent;

    let points = match kind {
        FilletKind::Chamfer => vec![t1, t2],
        FilletKind::Round => {
            let bisector = (d1 + d2).normalize();
            let center = curr + bisector * (r / (angle / 2.0).sin());

            let a1 = (t1 - center).y.atan2((t1 - center).x);
            let a2 = (t2 - center).y.atan2((t2 - center).x);
            let mut sweep = a2 - a1;
            while sweep > PI {
                sweep -= 2.0 * PI;
            }
            while sweep < -PI {
                sweep += 2.0 * PI;
            }

            let segments = ((angle * r * 2.0).ceil() as usize).max(4);
            (0..=segments)
                .map(|i| {
                    let a = a1 + sweep * i as f64 / segments as f64;
                    center + DVec2::new(a.cos(), a.sin()) * r
                })
                .collect()
        }
    };

    Some(CornerCut {
        points,
        radius: r,
        tangent,
    })
}

/// Build an outline path with per-vertex fillets applied.
///
/// Open paths keep their endpoints untouched. Closed paths end with a close
/// command. Fewer than two points produce an empty path.
pub fn generate_fillet_path(points: &[LayerPoint], closed: bool) -> Path {
    let mut path = Path::new();
    let n = points.len();
    if n < 2 {
        return path;
    }

    let mut outline: Vec<DVec2> = Vec::with_capacity(n);
    for (i, point) in points.iter().enumerate() {
        let curr = DVec2::new(point.x, point.z);
        let is_endpoint = !closed && (i == 0 || i == n - 1);

        let cut = match point.fillet {
            Some(fillet) if !is_endpoint => {
                let prev = points[(i + n - 1) % n];
                let next = points[(i + 1) % n];
                fillet_corner(
                    DVec2::new(prev.x, prev.z),
                    curr,
                    DVec2::new(next.x, next.z),
                    fillet.radius,
                    fillet.kind,
                )
            }
            _ => None,
        };

        match cut {
            Some(cut) => outline.extend(cut.points),
            None => outline.push(curr),
        }
    }

    let mut iter = outline.into_iter();
    if let Some(first) = iter.next() {
        path.move_to(first);
        for p in iter {
            path.line_to(p);
        }
        if closed {
            path.close();
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{parse_path_to_polygons, PathCommand};

    fn square(radius: f64, kind: FilletKind) -> Vec<LayerPoint> {
        vec![
            LayerPoint::new(0.0, 0.0),
            LayerPoint::new(2.0, 0.0).with_fillet(radius, kind),
            LayerPoint::new(2.0, 2.0),
            LayerPoint::new(0.0, 2.0),
        ]
    }

    #[test]
    fn test_no_fillet_is_polyline() {
        let pts = vec![LayerPoint::new(0.0, 0.0), LayerPoint::new(1.0, 0.0), LayerPoint::new(1.0, 1.0)];
        let path = generate_fillet_path(&pts, true);
        assert_eq!(path.to_string(), "M 0 0 L 1 0 L 1 1 Z");
        let open = generate_fillet_path(&pts, false);
        assert_eq!(open.to_string(), "M 0 0 L 1 0 L 1 1");
    }

    #[test]
    fn test_too_few_points() {
        assert!(generate_fillet_path(&[LayerPoint::new(0.0, 0.0)], true).is_empty());
    }

    #[test]
    fn test_chamfer_cuts_corner() {
        let path = generate_fillet_path(&square(0.5, FilletKind::Chamfer), true);
        let lines: Vec<DVec2> = path
            .commands()
            .iter()
            .filter_map(|c| match c {
                PathCommand::MoveTo(p) | PathCommand::LineTo(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].distance(DVec2::new(1.5, 0.0)) < 1e-9);
        assert!(lines[2].distance(DVec2::new(2.0, 0.5)) < 1e-9);
    }

    #[test]
    fn test_round_fillet_arc() {
        let cut = fillet_corner(
            DVec2::new(0.0, 0.0),
            DVec2::new(2.0, 0.0),
            DVec2::new(2.0, 2.0),
            0.5,
            FilletKind::Round,
        )
        .unwrap();
        assert!((cut.radius - 0.5).abs() < 1e-12);
        assert!(cut.points.len() >= 5);
        let center = DVec2::new(1.5, 0.5);
        for p in &cut.points {
            assert!((p.distance(center) - 0.5).abs() < 1e-9);
        }
        assert!(cut.points[0].distance(DVec2::new(1.5, 0.0)) < 1e-9);
        assert!(cut.points.last().unwrap().distance(DVec2::new(2.0, 0.5)) < 1e-9);
    }

    #[test]
    fn test_radius_clamped_to_edges() {
        // Oversized radii must leave at least 10% of each edge intact.
        for &(radius, next) in &[(5.0, DVec2::new(2.0, 2.0)), (3.0, DVec2::new(0.2, 0.5)), (1.0, DVec2::new(-1.5, 0.3))] {
            let curr = DVec2::new(2.0, 0.0);
            let prev = DVec2::ZERO;
            let cut = fillet_corner(prev, curr, next, radius, FilletKind::Round).unwrap();
            let shorter = (prev - curr).length().min((next - curr).length());
            assert!(cut.tangent <= 0.9 * shorter + 1e-12);
            assert!(cut.radius < shorter);
            assert!(cut.radius > 0.0);
        }
    }

    #[test]
    fn test_straight_corner_untouched() {
        assert!(fillet_corner(DVec2::ZERO, DVec2::X, DVec2::X * 2.0, 0.3, FilletKind::Round).is_none());
        assert!(fillet_corner(DVec2::ZERO, DVec2::X, DVec2::X * 2.0, 0.0, FilletKind::Round).is_none());
    }

    #[test]
    fn test_open_path_endpoints_kept() {
        let pts = vec![
            LayerPoint::new(0.0, 0.0).with_fillet(1.0, FilletKind::Round),
            LayerPoint::new(2.0, 0.0),
            LayerPoint::new(2.0, 2.0).with_fillet(1.0, FilletKind::Round),
        ];
        let path = generate_fillet_path(&pts, false);
        assert_eq!(path.to_string(), "M 0 0 L 2 0 L 2 2");
    }

    #[test]
    fn test_filleted_square_parses_back() {
        let path = generate_fillet_path(&square(0.2, FilletKind::Round), true);
        let polys = parse_path_to_polygons(&path.to_string());
        assert_eq!(polys.len(), 1);
        assert!(polys[0].outer.len() > 4);
        assert!(polys[0].outer.iter().all(|p| p.distance(DVec2::new(2.0, 0.0)) > 0.05));
    }
}
