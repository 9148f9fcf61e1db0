//! Camera state for the render kernel.
//!
//! The rig keeps the scene's base pose untouched and derives a fresh
//! `Camera` every frame from the orbit transform supplied by the caller.

use lux_core::CameraPose;
use lux_math::{OrbitTransform, Ray, UVec2, Vec3};

/// Camera state consumed by the kernel for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Always `direction × up`; not re-orthogonalised against `up`
    pub right: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub focal_distance: f32,
    /// Half extents of the image plane at `focal_distance`
    pub half_width: f32,
    pub half_height: f32,
}

impl Camera {
    /// Ray through normalized image coordinates.
    ///
    /// `ndc` spans [-1, 1] in both axes with +y pointing up.
    pub fn ray(&self, ndc: (f32, f32)) -> Ray {
        let target = self.position
            + self.direction * self.focal_distance
            + self.right * (ndc.0 * self.half_width)
            + self.up * (ndc.1 * self.half_height);
        Ray::new(self.position, (target - self.position).normalize())
    }
}

/// Half extents of the image plane: `h = tan(fov / 2) * f`, `w = aspect * h`.
pub fn half_extents(fov_degrees: f32, focal_distance: f32, extent: UVec2) -> (f32, f32) {
    let half_height = (0.5 * fov_degrees.to_radians()).tan() * focal_distance;
    let aspect = extent.x as f32 / extent.y.max(1) as f32;
    (aspect * half_height, half_height)
}

/// Derives per-frame camera state from a base pose and an orbit transform.
#[derive(Debug, Clone)]
pub struct CameraRig {
    base: CameraPose,
    half_width: f32,
    half_height: f32,
}

impl CameraRig {
    /// Create a rig for an image of `extent` pixels.
    pub fn new(base: CameraPose, extent: UVec2) -> Self {
        let (half_width, half_height) = half_extents(base.fov, base.focal_distance, extent);
        Self {
            base,
            half_width,
            half_height,
        }
    }

    pub fn base(&self) -> &CameraPose {
        &self.base
    }

    /// Replace the base pose (e.g. after a scene load).
    pub fn set_base(&mut self, base: CameraPose, extent: UVec2) {
        *self = Self::new(base, extent);
    }

    /// Recompute the half extents for a new resolution.
    pub fn resize(&mut self, extent: UVec2) {
        let (w, h) = half_extents(self.base.fov, self.base.focal_distance, extent);
        self.half_width = w;
        self.half_height = h;
    }

    /// Change the field of view (degrees) and recompute the half extents.
    pub fn set_fov(&mut self, fov: f32, extent: UVec2) {
        self.base.fov = fov;
        self.resize(extent);
    }

    pub fn half_extents(&self) -> (f32, f32) {
        (self.half_width, self.half_height)
    }

    /// Camera for the current frame.
    pub fn frame(&self, orbit: &OrbitTransform) -> Camera {
        let direction = orbit.apply_vector(self.base.direction);
        let up = orbit.apply_vector(self.base.up);

        Camera {
            position: orbit.apply_point(self.base.position),
            direction,
            up,
            right: direction.cross(up),
            fov: self.base.fov,
            focal_distance: self.base.focal_distance,
            half_width: self.half_width,
            half_height: self.half_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_math::{Mat4, Quat};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn rig() -> CameraRig {
        CameraRig::new(CameraPose::default(), UVec2::new(640, 480))
    }

    #[test]
    fn test_half_extents() {
        let (w, h) = half_extents(90.0, 1.0, UVec2::new(640, 480));
        assert!((h - 1.0).abs() < 1e-5);
        assert!((w - 640.0 / 480.0).abs() < 1e-5);

        let (w, h) = half_extents(60.0, 2.0, UVec2::new(100, 100));
        assert!((h - 2.0 * 30f32.to_radians().tan()).abs() < 1e-5);
        assert_eq!(w, h);
    }

    #[test]
    fn test_identity_frame_matches_base() {
        let rig = rig();
        let camera = rig.frame(&OrbitTransform::IDENTITY);
        let base = rig.base();

        assert_eq!(camera.position, base.position);
        assert_eq!(camera.direction, base.direction);
        assert_eq!(camera.up, base.up);
        assert_eq!(camera.right, base.direction.cross(base.up));
    }

    #[test]
    fn test_zoom_divides_position() {
        let camera = rig().frame(&OrbitTransform::new(Mat4::IDENTITY, 2.0));
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 2.5));
        assert_eq!(camera.direction, Vec3::NEG_Z);
    }

    #[test]
    fn test_resize_updates_half_width_only_by_aspect() {
        let mut rig = rig();
        let (_, h_before) = rig.half_extents();
        rig.resize(UVec2::new(800, 400));
        let (w, h) = rig.half_extents();

        assert_eq!(h, h_before);
        assert!((w - 2.0 * h).abs() < 1e-5);
    }

    #[test]
    fn test_set_fov_recomputes() {
        let mut rig = rig();
        rig.set_fov(90.0, UVec2::new(100, 100));
        let (w, h) = rig.half_extents();
        assert!((h - 1.0).abs() < 1e-5);
        assert!((w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_center_ray_follows_direction() {
        let camera = rig().frame(&OrbitTransform::from_quat(Quat::from_rotation_y(0.7), 1.0));
        let ray = camera.ray((0.0, 0.0));
        assert!((ray.direction - camera.direction.normalize()).length() < 1e-5);
    }

    #[test]
    fn test_orthonormal_orbits_keep_basis_orthonormal() {
        let rig = rig();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let axis = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize_or(Vec3::Y);
            let angle = rng.gen_range(-3.0..3.0);
            let orbit = OrbitTransform::from_quat(Quat::from_axis_angle(axis, angle), 1.0);
            let camera = rig.frame(&orbit);

            assert!(camera.direction.dot(camera.up).abs() < 1e-4);
            assert!(camera.right.dot(camera.direction).abs() < 1e-4);
            assert!(camera.right.dot(camera.up).abs() < 1e-4);
            assert!((camera.right.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sheared_orbit_breaks_dir_up_orthogonality() {
        // right is a cross product, so it stays perpendicular to both inputs,
        // but up is not corrected and drifts away from the view direction.
        let rig = rig();
        let shear = Mat4::from_cols_array(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.5, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let orbit = OrbitTransform::new(shear, 1.0);
        assert!(!orbit.is_orthonormal(1e-5));

        let camera = rig.frame(&orbit);
        assert!(camera.right.dot(camera.direction).abs() < 1e-5);
        assert!(camera.right.dot(camera.up).abs() < 1e-5);
        assert!(camera.direction.dot(camera.up).abs() > 0.1);
    }
}
