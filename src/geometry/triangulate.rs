use super::Polygon;

/// Ear-clip a polygon with holes. Indices address `polygon.points()` order.
///
/// Returns an empty list when triangulation fails.
pub fn triangulate(polygon: &Polygon) -> Vec<u32> {
    let total = polygon.outer.len() + polygon.holes.iter().map(Vec::len).sum::<usize>();
    let mut flat = Vec::with_capacity(total * 2);
    let mut hole_starts = Vec::with_capacity(polygon.holes.len());

    for p in &polygon.outer {
        flat.extend_from_slice(&[p.x, p.y]);
    }
    for hole in &polygon.holes {
        hole_starts.push(flat.len() / 2);
        for p in hole {
            flat.extend_from_slice(&[p.x, p.y]);
        }
    }

    match earcutr::earcut(&flat, &hole_starts, 2) {
        Ok(indices) => indices.into_iter().map(|i| i as u32).collect(),
        Err(_) => {
            tracing::debug!(vertices = total, "triangulation failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[test]
    fn test_triangulate_square_with_hole() {
        let poly = Polygon::new(vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(4.0, 0.0),
            DVec2::new(4.0, 4.0),
            DVec2::new(0.0, 4.0),
        ])
        .with_hole(vec![
            DVec2::new(1.0, 1.0),
            DVec2::new(1.0, 3.0),
            DVec2::new(3.0, 3.0),
            DVec2::new(3.0, 1.0),
        ]);
        let indices = triangulate(&poly);
        // 8 vertices, one hole: n + 2h - 2 = 8 triangles
        assert_eq!(indices.len(), 8 * 3);
        assert!(indices.iter().all(|&i| i < 8));
    }

    #[test]
    fn test_triangulate_empty() {
        assert!(triangulate(&Polygon::default()).is_empty());
    }
}
