//! Transform types for placed items and layer nodes.

use glam::{EulerRot, Quat, Vec3};

/// Node-level TRS transform of a placed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemTransform {
    pub translation: [f32; 3],
    /// Unit quaternion `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for ItemTransform {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl ItemTransform {
    /// Check if this is an identity transform.
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Convert intrinsic XYZ Euler angles (radians) to a quaternion `[x, y, z, w]`.
pub fn euler_xyz_to_quat(x: f32, y: f32, z: f32) -> [f32; 4] {
    Quat::from_euler(EulerRot::XYZ, x, y, z).normalize().to_array()
}

/// Rotate a vector by a quaternion given as `[x, y, z, w]`.
pub fn rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    (Quat::from_array(q) * Vec3::from_array(v)).to_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_zero_euler_is_identity() {
        assert_eq!(euler_xyz_to_quat(0.0, 0.0, 0.0), [0.0, 0.0, 0.0, 1.0]);
        assert!(ItemTransform::default().is_identity());
    }

    #[test]
    fn test_quarter_turn_about_y() {
        let q = euler_xyz_to_quat(0.0, FRAC_PI_2, 0.0);
        let v = rotate(q, [1.0, 0.0, 0.0]);
        assert!(v[0].abs() < 1e-5);
        assert!((v[2] + 1.0).abs() < 1e-5);
    }
}
