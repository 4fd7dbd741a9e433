//! Scene description types consumed by the export pipeline.
//!
//! These mirror the snapshot handed over by the persistence layer. Field names
//! are camelCase on the wire.

mod color;
mod transform;

pub use color::{hex_to_linear, parse_hex_color, srgb_to_linear};
pub use transform::{euler_xyz_to_quat, rotate, ItemTransform};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point on the floor plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub z: f64,
}

impl Point2 {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn to_dvec2(self) -> glam::DVec2 {
        glam::DVec2::new(self.x, self.z)
    }
}

/// A 3-component value used for item position, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Outline of the base floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FloorShape {
    /// Axis-aligned rectangle spanning `(0,0)..(width,depth)`.
    Rectangle { width: f64, depth: f64 },
    /// Arbitrary closed polygon.
    Polygon { points: Vec<Point2> },
}

impl Default for FloorShape {
    fn default() -> Self {
        FloorShape::Rectangle {
            width: DEFAULT_FLOOR_WIDTH,
            depth: DEFAULT_FLOOR_DEPTH,
        }
    }
}

pub const DEFAULT_FLOOR_WIDTH: f64 = 5.0;
pub const DEFAULT_FLOOR_DEPTH: f64 = 4.0;

impl FloorShape {
    /// The floor outline as a ring of points.
    ///
    /// Polygons with fewer than three points fall back to the default rectangle.
    pub fn outline(&self) -> Vec<Point2> {
        match self {
            FloorShape::Polygon { points } if points.len() >= 3 => points.clone(),
            FloorShape::Polygon { .. } => {
                rectangle_outline(DEFAULT_FLOOR_WIDTH, DEFAULT_FLOOR_DEPTH)
            }
            FloorShape::Rectangle { width, depth } => rectangle_outline(
                positive_or(*width, DEFAULT_FLOOR_WIDTH),
                positive_or(*depth, DEFAULT_FLOOR_DEPTH),
            ),
        }
    }

    /// Returns `true` when [`outline`](Self::outline) substitutes defaults:
    /// polygons with fewer than 3 points, rectangles with a zero, negative
    /// or non-finite side.
    pub fn is_degenerate(&self) -> bool {
        match self {
            FloorShape::Polygon { points } => points.len() < 3,
            FloorShape::Rectangle { width, depth } => !is_positive(*width) || !is_positive(*depth),
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn positive_or(value: f64, default: f64) -> f64 {
    if is_positive(value) {
        value
    } else {
        default
    }
}

fn rectangle_outline(width: f64, depth: f64) -> Vec<Point2> {
    vec![
        Point2::new(0.0, 0.0),
        Point2::new(width, 0.0),
        Point2::new(width, depth),
        Point2::new(0.0, depth),
    ]
}

/// Root input: a full scene description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub floor: FloorShape,
    #[serde(default)]
    pub floor_color: Option<String>,
    #[serde(default)]
    pub floor_texture: Option<TextureBinding>,
    /// World units covered by one texture repeat on the floor.
    #[serde(default = "default_one")]
    pub texture_scale: f64,
    #[serde(default)]
    pub floor_layers: Vec<FloorLayer>,
    #[serde(default)]
    pub perimeter_layers: Vec<PerimeterLayer>,
    #[serde(default)]
    pub items: Vec<SceneItem>,
}

fn default_one() -> f64 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

/// How a floor layer's outline is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Preset,
    Freehand,
}

/// Corner treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilletKind {
    Round,
    Chamfer,
}

/// Fillet request on a freehand corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fillet {
    pub radius: f64,
    #[serde(rename = "type")]
    pub kind: FilletKind,
}

/// A freehand outline point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerPoint {
    pub x: f64,
    pub z: f64,
    #[serde(default)]
    pub fillet: Option<Fillet>,
}

impl LayerPoint {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z, fillet: None }
    }

    pub fn with_fillet(mut self, radius: f64, kind: FilletKind) -> Self {
        self.fillet = Some(Fillet { radius, kind });
        self
    }
}

/// Texture reference on a floor or layer, with optional scalar overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureBinding {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub roughness: Option<f32>,
    #[serde(default)]
    pub metalness: Option<f32>,
    #[serde(default)]
    pub ao_intensity: Option<f32>,
    #[serde(default)]
    pub normal_scale: Option<f32>,
}

/// A decorative shape painted on the floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorLayer {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub geometry_type: GeometryKind,
    /// Preset shape code.
    #[serde(default)]
    pub shape_id: Option<String>,
    /// Freehand outline in layer-local coordinates.
    #[serde(default)]
    pub points: Vec<LayerPoint>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_one")]
    pub width: f64,
    #[serde(default = "default_one")]
    pub height: f64,
    /// Degrees.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub texture: Option<TextureBinding>,
}

impl Default for FloorLayer {
    fn default() -> Self {
        Self {
            id: None,
            geometry_type: GeometryKind::Preset,
            shape_id: None,
            points: Vec::new(),
            x: 0.0,
            z: 0.0,
            width: 1.0,
            height: 1.0,
            rotation: 0.0,
            color: None,
            opacity: 1.0,
            z_index: 0,
            texture: None,
        }
    }
}

/// One concentric ring around the floor (wall, sidewalk, curb...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerimeterLayer {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub width: f64,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub texture_id: Option<i64>,
    #[serde(default)]
    pub texture_url: Option<String>,
    #[serde(default)]
    pub texture_scale: Option<f64>,
}

pub const DEFAULT_PERIMETER_HEIGHT: f64 = 0.1;

impl PerimeterLayer {
    pub fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or("wall")
    }

    /// Extrusion depth, defaulting when absent or non-positive.
    pub fn extrusion_height(&self) -> f64 {
        match self.height {
            Some(h) if h > 0.0 => h,
            _ => DEFAULT_PERIMETER_HEIGHT,
        }
    }

    pub fn is_textured(&self) -> bool {
        self.texture_id.is_some() || self.texture_url.is_some()
    }
}

/// Per-sub-mesh material override on a placed model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialOverride {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub metalness: Option<f32>,
    #[serde(default)]
    pub roughness: Option<f32>,
}

/// A placed model instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub id: String,
    pub model_id: String,
    #[serde(default = "zero_vector")]
    pub position: Vector3,
    /// Euler XYZ, radians.
    #[serde(default = "zero_vector")]
    pub rotation: Vector3,
    #[serde(default = "one_vector")]
    pub scale: Vector3,
    #[serde(default)]
    pub material_config: HashMap<String, MaterialOverride>,
}

fn zero_vector() -> Vector3 {
    Vector3::ZERO
}

fn one_vector() -> Vector3 {
    Vector3::ONE
}

impl SceneItem {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
            material_config: HashMap::new(),
        }
    }

    pub fn transform(&self) -> ItemTransform {
        ItemTransform {
            translation: self.position.to_array(),
            rotation: euler_xyz_to_quat(self.rotation.x, self.rotation.y, self.rotation.z),
            scale: self.scale.to_array(),
        }
    }
}

/// Kind of a texture library record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextureKind {
    Simple,
    Pbr,
}

/// Texture library record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TextureKind,
    /// Color map for SIMPLE records.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub base_color_url: Option<String>,
    #[serde(default)]
    pub normal_url: Option<String>,
    #[serde(default)]
    pub roughness_url: Option<String>,
    #[serde(default)]
    pub metallic_url: Option<String>,
    #[serde(default)]
    pub ao_url: Option<String>,
    #[serde(default, rename = "roughnessValue")]
    pub roughness: Option<f32>,
    #[serde(default, rename = "metalnessValue")]
    pub metalness: Option<f32>,
    #[serde(default)]
    pub ao_intensity: Option<f32>,
    #[serde(default)]
    pub normal_scale: Option<f32>,
}

impl TextureRecord {
    /// The color map, whatever the record kind.
    pub fn color_url(&self) -> Option<&str> {
        self.base_color_url.as_deref().or(self.url.as_deref())
    }
}

/// Preset shape library entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeRecord {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub svg_path: String,
}

/// Resolved location of a model's binary asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    #[serde(default)]
    pub file_name: Option<String>,
    pub file_path: String,
    /// Hex IV; present when the file is encrypted at rest.
    #[serde(default)]
    pub iv: Option<String>,
    /// Hex auth tag; present when the file is encrypted at rest.
    #[serde(default)]
    pub auth_tag: Option<String>,
}

impl ModelFile {
    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some() && self.auth_tag.is_some()
    }
}

/// Everything the persistence layer resolves for one export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub scene: SceneDescription,
    #[serde(default)]
    pub textures: HashMap<i64, TextureRecord>,
    #[serde(default)]
    pub shapes: Vec<ShapeRecord>,
    #[serde(default)]
    pub models: HashMap<String, ModelFile>,
}

impl SceneSnapshot {
    pub fn shape(&self, code: &str) -> Option<&ShapeRecord> {
        self.shapes.iter().find(|s| s.code == code)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl Iterator<Item = [f32; 3]>) -> Option<Self> {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        let mut has_points = false;

        for p in points {
            has_points = true;
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        if has_points {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn dimensions(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}
