//! Vector path parsing and tessellation.
//!
//! Supports the SVG path command set (`M L H V C S Q T A Z`, absolute and
//! relative). Parsed paths are normalized to absolute move, line, cubic and
//! quadratic commands; arcs become cubic approximations.

use super::{resolve_contours, Polygon};
use glam::DVec2;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use thiserror::Error;

/// Number of line segments each curve is flattened into.
pub const CURVE_SEGMENTS: usize = 12;

const POINT_EPSILON: f64 = 1e-9;
const RADIUS_EPSILON: f64 = 1e-6;

/// An absolute path command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(DVec2),
    LineTo(DVec2),
    CubicTo { c1: DVec2, c2: DVec2, to: DVec2 },
    QuadTo { c: DVec2, to: DVec2 },
    Close,
}

/// A sequence of absolute path commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    commands: Vec<PathCommand>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, p: DVec2) {
        self.commands.push(PathCommand::MoveTo(p));
    }

    pub fn line_to(&mut self, p: DVec2) {
        self.commands.push(PathCommand::LineTo(p));
    }

    pub fn cubic_to(&mut self, c1: DVec2, c2: DVec2, to: DVec2) {
        self.commands.push(PathCommand::CubicTo { c1, c2, to });
    }

    pub fn quad_to(&mut self, c: DVec2, to: DVec2) {
        self.commands.push(PathCommand::QuadTo { c, to });
    }

    pub fn close(&mut self) {
        self.commands.push(PathCommand::Close);
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Flatten into one point list per subpath. Curves contribute
    /// [`CURVE_SEGMENTS`] segments each; repeated points are collapsed and a
    /// trailing point equal to the subpath start is dropped.
    pub fn flatten(&self) -> Vec<Vec<DVec2>> {
        let mut contours = Vec::new();
        let mut current: Vec<DVec2> = Vec::new();
        let mut cursor = DVec2::ZERO;

        fn push(contour: &mut Vec<DVec2>, p: DVec2) {
            if contour.last().map_or(true, |last| last.distance(p) > POINT_EPSILON) {
                contour.push(p);
            }
        }

        for cmd in &self.commands {
            match *cmd {
                PathCommand::MoveTo(p) => {
                    if current.len() > 1 {
                        contours.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(p);
                    cursor = p;
                }
                PathCommand::LineTo(p) => {
                    push(&mut current, p);
                    cursor = p;
                }
                PathCommand::CubicTo { c1, c2, to } => {
                    for i in 1..=CURVE_SEGMENTS {
                        let t = i as f64 / CURVE_SEGMENTS as f64;
                        let mt = 1.0 - t;
                        let p = cursor * (mt * mt * mt)
                            + c1 * (3.0 * mt * mt * t)
                            + c2 * (3.0 * mt * t * t)
                            + to * (t * t * t);
                        push(&mut current, p);
                    }
                    cursor = to;
                }
                PathCommand::QuadTo { c, to } => {
                    for i in 1..=CURVE_SEGMENTS {
                        let t = i as f64 / CURVE_SEGMENTS as f64;
                        let mt = 1.0 - t;
                        let p = cursor * (mt * mt) + c * (2.0 * mt * t) + to * (t * t);
                        push(&mut current, p);
                    }
                    cursor = to;
                }
                PathCommand::Close => {
                    if let Some(&start) = current.first() {
                        contours.push(std::mem::take(&mut current));
                        // Drawing may continue from the closed subpath's start.
                        current.push(start);
                        cursor = start;
                    }
                }
            }
        }
        if current.len() > 1 {
            contours.push(current);
        }

        for contour in &mut contours {
            while contour.len() > 1
                && contour[0].distance(contour[contour.len() - 1]) <= POINT_EPSILON
            {
                contour.pop();
            }
        }
        contours.retain(|c| c.len() >= 3);
        contours
    }

    /// Filled regions of this path, with holes resolved by nesting depth.
    pub fn to_polygons(&self) -> Vec<Polygon> {
        resolve_contours(self.flatten())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cmd in &self.commands {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match cmd {
                PathCommand::MoveTo(p) => write!(f, "M {} {}", p.x, p.y)?,
                PathCommand::LineTo(p) => write!(f, "L {} {}", p.x, p.y)?,
                PathCommand::CubicTo { c1, c2, to } => write!(
                    f,
                    "C {} {} {} {} {} {}",
                    c1.x, c1.y, c2.x, c2.y, to.x, to.y
                )?,
                PathCommand::QuadTo { c, to } => write!(f, "Q {} {} {} {}", c.x, c.y, to.x, to.y)?,
                PathCommand::Close => f.write_str("Z")?,
            }
        }
        Ok(())
    }
}

/// A syntax error in path text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid path at byte {position}: {message}")]
pub struct PathParseError {
    pub position: usize,
    pub message: String,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> PathParseError {
        PathParseError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn skip_separators(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() || b == b',' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_separators();
        self.pos >= self.bytes.len()
    }

    fn at_number(&mut self) -> bool {
        self.skip_separators();
        matches!(self.bytes.get(self.pos), Some(b'0'..=b'9' | b'.' | b'-' | b'+'))
    }

    fn command(&mut self) -> Result<u8, PathParseError> {
        self.skip_separators();
        match self.bytes.get(self.pos) {
            Some(&b) if b"MmLlHhVvCcSsQqTtAaZz".contains(&b) => {
                self.pos += 1;
                Ok(b)
            }
            Some(&b) => Err(self.error(format!("unexpected character '{}'", b as char))),
            None => Err(self.error("unexpected end of path")),
        }
    }

    fn number(&mut self) -> Result<f64, PathParseError> {
        self.skip_separators();
        let start = self.pos;
        let bytes = self.bytes;
        let mut end = start;

        if matches!(bytes.get(end), Some(b'-' | b'+')) {
            end += 1;
        }
        let mut digits = 0;
        while matches!(bytes.get(end), Some(b'0'..=b'9')) {
            end += 1;
            digits += 1;
        }
        if bytes.get(end) == Some(&b'.') {
            end += 1;
            while matches!(bytes.get(end), Some(b'0'..=b'9')) {
                end += 1;
                digits += 1;
            }
        }
        if digits == 0 {
            return Err(self.error("expected number"));
        }
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp_end = end + 1;
            if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
                exp_end += 1;
            }
            let exp_digits_start = exp_end;
            while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
                exp_end += 1;
            }
            if exp_end > exp_digits_start {
                end = exp_end;
            }
        }

        let text = std::str::from_utf8(&bytes[start..end]).map_err(|_| self.error("invalid number"))?;
        let value = text.parse::<f64>().map_err(|_| self.error(format!("invalid number '{}'", text)))?;
        self.pos = end;
        Ok(value)
    }

    fn point(&mut self) -> Result<DVec2, PathParseError> {
        let x = self.number()?;
        let y = self.number()?;
        Ok(DVec2::new(x, y))
    }

    /// Arc flags are single digits and may be written without separators.
    fn flag(&mut self) -> Result<bool, PathParseError> {
        self.skip_separators();
        match self.bytes.get(self.pos) {
            Some(b'0') => {
                self.pos += 1;
                Ok(false)
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(true)
            }
            _ => Err(self.error("expected arc flag")),
        }
    }
}

/// Parse path text into absolute commands.
pub fn parse_path(text: &str) -> Result<Path, PathParseError> {
    let mut scanner = Scanner::new(text);
    let mut path = Path::new();

    let mut cursor = DVec2::ZERO;
    let mut start = DVec2::ZERO;
    let mut control = DVec2::ZERO;
    let mut previous: u8 = 0;

    while !scanner.at_end() {
        let letter = scanner.command()?;
        let kind = letter.to_ascii_uppercase();
        let relative = letter.is_ascii_lowercase();
        if previous == 0 && kind != b'M' {
            return Err(scanner.error("path must start with a move command"));
        }

        let mut first = true;
        loop {
            let origin = if relative { cursor } else { DVec2::ZERO };
            match kind {
                b'M' => {
                    let p = scanner.point()? + origin;
                    if first {
                        path.move_to(p);
                        start = p;
                    } else {
                        path.line_to(p);
                    }
                    cursor = p;
                }
                b'L' => {
                    let p = scanner.point()? + origin;
                    path.line_to(p);
                    cursor = p;
                }
                b'H' => {
                    let x = scanner.number()? + origin.x;
                    cursor = DVec2::new(x, cursor.y);
                    path.line_to(cursor);
                }
                b'V' => {
                    let y = scanner.number()? + origin.y;
                    cursor = DVec2::new(cursor.x, y);
                    path.line_to(cursor);
                }
                b'C' => {
                    let c1 = scanner.point()? + origin;
                    let c2 = scanner.point()? + origin;
                    let to = scanner.point()? + origin;
                    path.cubic_to(c1, c2, to);
                    control = c2;
                    cursor = to;
                }
                b'S' => {
                    let c1 = if matches!(previous, b'C' | b'S') {
                        cursor * 2.0 - control
                    } else {
                        cursor
                    };
                    let c2 = scanner.point()? + origin;
                    let to = scanner.point()? + origin;
                    path.cubic_to(c1, c2, to);
                    control = c2;
                    cursor = to;
                }
                b'Q' => {
                    let c = scanner.point()? + origin;
                    let to = scanner.point()? + origin;
                    path.quad_to(c, to);
                    control = c;
                    cursor = to;
                }
                b'T' => {
                    let c = if matches!(previous, b'Q' | b'T') {
                        cursor * 2.0 - control
                    } else {
                        cursor
                    };
                    let to = scanner.point()? + origin;
                    path.quad_to(c, to);
                    control = c;
                    cursor = to;
                }
                b'A' => {
                    let rx = scanner.number()?;
                    let ry = scanner.number()?;
                    let rotation = scanner.number()?;
                    let large_arc = scanner.flag()?;
                    let sweep = scanner.flag()?;
                    let to = scanner.point()? + origin;
                    // Coincident endpoints draw nothing.
                    if cursor.distance(to) >= POINT_EPSILON {
                        if rx.abs() < RADIUS_EPSILON || ry.abs() < RADIUS_EPSILON {
                            path.line_to(to);
                        } else {
                            for [c1, c2, end] in
                                arc_to_cubics(cursor, to, rx, ry, rotation, large_arc, sweep)
                            {
                                path.cubic_to(c1, c2, end);
                            }
                        }
                    }
                    cursor = to;
                }
                b'Z' => {
                    path.close();
                    cursor = start;
                }
                _ => unreachable!("command() only yields path letters"),
            }

            if !matches!(kind, b'C' | b'S' | b'Q' | b'T') {
                control = cursor;
            }
            previous = kind;
            first = false;

            if kind == b'Z' || !scanner.at_number() {
                break;
            }
        }
    }

    Ok(path)
}

/// Parse path text straight into filled polygons. Syntax errors yield no polygons.
pub fn parse_path_to_polygons(text: &str) -> Vec<Polygon> {
    match parse_path(text) {
        Ok(path) => path.to_polygons(),
        Err(e) => {
            tracing::debug!("discarding path: {}", e);
            Vec::new()
        }
    }
}

fn vector_angle(u: DVec2, v: DVec2) -> f64 {
    let sign = if u.perp_dot(v) < 0.0 { -1.0 } else { 1.0 };
    let cos = (u.dot(v) / (u.length() * v.length())).clamp(-1.0, 1.0);
    sign * cos.acos()
}

/// Approximate an elliptical arc by cubic Béziers, one per quarter turn or less.
///
/// Returns `[control1, control2, end]` per segment. Radii too small to reach
/// `to` are scaled up uniformly. `rotation` is the ellipse x-axis angle in degrees.
pub fn arc_to_cubics(
    from: DVec2,
    to: DVec2,
    rx: f64,
    ry: f64,
    rotation: f64,
    large_arc: bool,
    sweep: bool,
) -> Vec<[DVec2; 3]> {
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if from.distance(to) < POINT_EPSILON || rx < RADIUS_EPSILON || ry < RADIUS_EPSILON {
        return Vec::new();
    }

    let (sin_phi, cos_phi) = rotation.to_radians().sin_cos();
    let half = (from - to) * 0.5;
    let x1 = cos_phi * half.x + sin_phi * half.y;
    let y1 = -sin_phi * half.x + cos_phi * half.y;

    let lambda = (x1 * x1) / (rx * rx) + (y1 * y1) / (ry * ry);
    if lambda > 1.0 {
        let s = lambda.sqrt();
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let numerator = rx2 * ry2 - rx2 * y1 * y1 - ry2 * x1 * x1;
    let denominator = rx2 * y1 * y1 + ry2 * x1 * x1;
    let mut coef = (numerator / denominator).max(0.0).sqrt();
    if large_arc == sweep {
        coef = -coef;
    }
    let cx1 = coef * rx * y1 / ry;
    let cy1 = -coef * ry * x1 / rx;
    let mid = (from + to) * 0.5;
    let center = DVec2::new(
        cos_phi * cx1 - sin_phi * cy1 + mid.x,
        sin_phi * cx1 + cos_phi * cy1 + mid.y,
    );

    let u = DVec2::new((x1 - cx1) / rx, (y1 - cy1) / ry);
    let v = DVec2::new((-x1 - cx1) / rx, (-y1 - cy1) / ry);
    let theta1 = vector_angle(DVec2::X, u);
    let mut delta = vector_angle(u, v);
    if !sweep && delta > 0.0 {
        delta -= 2.0 * PI;
    } else if sweep && delta < 0.0 {
        delta += 2.0 * PI;
    }

    // Tolerance keeps an exact quarter turn in one segment.
    let segments = ((delta.abs() / FRAC_PI_2) - 1e-9).ceil().max(1.0) as usize;
    let step = delta / segments as f64;
    let alpha = 4.0 / 3.0 * (step / 4.0).tan();

    let map = |q: DVec2| {
        DVec2::new(
            cos_phi * rx * q.x - sin_phi * ry * q.y + center.x,
            sin_phi * rx * q.x + cos_phi * ry * q.y + center.y,
        )
    };

    let mut result = Vec::with_capacity(segments);
    for i in 0..segments {
        let t1 = theta1 + step * i as f64;
        let t2 = t1 + step;
        let p1 = DVec2::new(t1.cos(), t1.sin());
        let p2 = DVec2::new(t2.cos(), t2.sin());
        let c1 = p1 + DVec2::new(-t1.sin(), t1.cos()) * alpha;
        let c2 = p2 - DVec2::new(-t2.sin(), t2.cos()) * alpha;
        let end = if i + 1 == segments { to } else { map(p2) };
        result.push([map(c1), map(c2), end]);
    }
    result
}
