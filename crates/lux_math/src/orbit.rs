//! Orbit/zoom transform handed to the renderer by the interaction layer.
//!
//! The renderer only consumes the transform; how it is built from mouse
//! input is up to the caller.

use glam::{Mat4, Quat, Vec3};

/// Rotation plus uniform zoom applied to a base camera pose.
///
/// `rotation` is expected to be a pure rotation, but nothing enforces it:
/// a sheared matrix is applied as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitTransform {
    /// Rotation applied to the base camera position and basis vectors
    pub rotation: Mat4,
    /// Zoom factor; the base position is divided by it
    pub scale: f32,
}

impl Default for OrbitTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl OrbitTransform {
    /// No rotation, no zoom.
    pub const IDENTITY: OrbitTransform = OrbitTransform {
        rotation: Mat4::IDENTITY,
        scale: 1.0,
    };

    /// Create a transform from a rotation matrix and zoom factor.
    pub fn new(rotation: Mat4, scale: f32) -> Self {
        Self { rotation, scale }
    }

    /// Create a transform from a quaternion and zoom factor.
    pub fn from_quat(rotation: Quat, scale: f32) -> Self {
        Self::new(Mat4::from_quat(rotation), scale)
    }

    /// Apply the transform to a camera position (zoom, then rotate).
    pub fn apply_point(&self, point: Vec3) -> Vec3 {
        self.rotation.transform_point3(point / self.scale)
    }

    /// Apply the rotation to a direction. Zoom does not affect directions.
    pub fn apply_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.transform_vector3(vector)
    }

    /// True if the upper 3x3 of `rotation` is orthonormal within `epsilon`.
    pub fn is_orthonormal(&self, epsilon: f32) -> bool {
        let x = self.rotation.x_axis.truncate();
        let y = self.rotation.y_axis.truncate();
        let z = self.rotation.z_axis.truncate();

        let unit = |v: Vec3| (v.length_squared() - 1.0).abs() <= epsilon;
        unit(x)
            && unit(y)
            && unit(z)
            && x.dot(y).abs() <= epsilon
            && y.dot(z).abs() <= epsilon
            && z.dot(x).abs() <= epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_is_noop() {
        let orbit = OrbitTransform::IDENTITY;
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(orbit.apply_point(p), p);
        assert_eq!(orbit.apply_vector(p), p);
    }

    #[test]
    fn test_zoom_divides_position_only() {
        let orbit = OrbitTransform::new(Mat4::IDENTITY, 2.0);
        assert_eq!(orbit.apply_point(Vec3::new(0.0, 0.0, 10.0)), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(orbit.apply_vector(Vec3::Z), Vec3::Z);
    }

    #[test]
    fn test_rotation_about_y() {
        let orbit = OrbitTransform::from_quat(Quat::from_rotation_y(FRAC_PI_2), 1.0);
        let rotated = orbit.apply_vector(Vec3::X);
        assert!((rotated - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_orthonormal_detection() {
        let rotation = OrbitTransform::from_quat(Quat::from_rotation_x(0.3), 1.0);
        assert!(rotation.is_orthonormal(1e-5));

        let shear = OrbitTransform::new(
            Mat4::from_cols_array(&[
                1.0, 0.0, 0.0, 0.0, //
                0.4, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ]),
            1.0,
        );
        assert!(!shear.is_orthonormal(1e-5));
    }
}
