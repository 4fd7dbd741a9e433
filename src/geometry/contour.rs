//! Contour orientation, containment and hole assignment.

use glam::DVec2;

/// A filled region: one outer ring and any number of hole rings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub outer: Vec<DVec2>,
    pub holes: Vec<Vec<DVec2>>,
}

impl Polygon {
    pub fn new(outer: Vec<DVec2>) -> Self {
        Self { outer, holes: Vec::new() }
    }

    pub fn with_hole(mut self, hole: Vec<DVec2>) -> Self {
        self.holes.push(hole);
        self
    }

    /// Iterate all vertices, outer ring first.
    pub fn points(&self) -> impl Iterator<Item = DVec2> + '_ {
        self.outer.iter().chain(self.holes.iter().flatten()).copied()
    }

    /// Area of the outer ring minus the holes.
    pub fn area(&self) -> f64 {
        signed_area(&self.outer).abs() - self.holes.iter().map(|h| signed_area(h).abs()).sum::<f64>()
    }

    /// Bounding box as `(min, max)`; `None` when empty.
    pub fn bounds(&self) -> Option<(DVec2, DVec2)> {
        let mut iter = self.points();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    pub fn translate(&mut self, offset: DVec2) {
        for p in self.outer.iter_mut().chain(self.holes.iter_mut().flatten()) {
            *p += offset;
        }
    }
}

/// Shoelace area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[DVec2]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Even-odd ray-casting containment test.
pub fn point_in_ring(point: DVec2, ring: &[DVec2]) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let a = ring[i];
        let b = ring[j];
        if (a.y > point.y) != (b.y > point.y) {
            let x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn ring_inside(inner: &[DVec2], outer: &[DVec2]) -> bool {
    signed_area(outer).abs() > signed_area(inner).abs()
        && inner.iter().any(|p| point_in_ring(*p, outer))
}

/// Resolve a set of closed contours into polygons with holes.
///
/// A contour's nesting depth is the number of other contours enclosing it.
/// Even depths are outer boundaries, odd depths are holes, and each hole is
/// attached to its innermost enclosing outer boundary.
pub fn resolve_contours(contours: Vec<Vec<DVec2>>) -> Vec<Polygon> {
    let contours: Vec<Vec<DVec2>> = contours
        .into_iter()
        .filter(|c| c.len() >= 3 && signed_area(c).abs() > f64::EPSILON)
        .collect();

    let parents: Vec<Vec<usize>> = contours
        .iter()
        .enumerate()
        .map(|(i, c)| {
            (0..contours.len())
                .filter(|&j| j != i && ring_inside(c, &contours[j]))
                .collect()
        })
        .collect();

    let mut polygons = Vec::new();
    let mut polygon_of = vec![None; contours.len()];
    for (i, c) in contours.iter().enumerate() {
        if parents[i].len() % 2 == 0 {
            polygon_of[i] = Some(polygons.len());
            polygons.push(Polygon::new(c.clone()));
        }
    }

    for (i, c) in contours.iter().enumerate() {
        if parents[i].len() % 2 == 0 {
            continue;
        }
        let innermost = parents[i]
            .iter()
            .filter_map(|&j| polygon_of[j].map(|p| (j, p)))
            .min_by(|(a, _), (b, _)| {
                signed_area(&contours[*a])
                    .abs()
                    .total_cmp(&signed_area(&contours[*b]).abs())
            });
        if let Some((_, poly)) = innermost {
            polygons[poly].holes.push(c.clone());
        }
    }

    polygons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(x0, y0),
            DVec2::new(x1, y0),
            DVec2::new(x1, y1),
            DVec2::new(x0, y1),
        ]
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = rect(0.0, 0.0, 2.0, 3.0);
        assert_eq!(signed_area(&ccw), 6.0);
        let mut cw = ccw.clone();
        cw.reverse();
        assert_eq!(signed_area(&cw), -6.0);
    }

    #[test]
    fn test_point_in_ring() {
        let r = rect(0.0, 0.0, 2.0, 2.0);
        assert!(point_in_ring(DVec2::new(1.0, 1.0), &r));
        assert!(!point_in_ring(DVec2::new(3.0, 1.0), &r));
    }

    #[test]
    fn test_nested_contours() {
        // Outer, hole, island inside the hole, and a separate square.
        let polys = resolve_contours(vec![
            rect(0.0, 0.0, 10.0, 10.0),
            rect(2.0, 2.0, 8.0, 8.0),
            rect(4.0, 4.0, 6.0, 6.0),
            rect(20.0, 0.0, 22.0, 2.0),
        ]);
        assert_eq!(polys.len(), 3);
        assert_eq!(polys[0].holes.len(), 1);
        assert!(polys[1].holes.is_empty());
        assert!(polys[2].holes.is_empty());
        assert_eq!(polys[0].area(), 100.0 - 36.0);
    }

    #[test]
    fn test_degenerate_contours_dropped() {
        let polys = resolve_contours(vec![vec![DVec2::ZERO, DVec2::X], vec![DVec2::ZERO, DVec2::X, DVec2::X * 2.0]]);
        assert!(polys.is_empty());
    }
}
