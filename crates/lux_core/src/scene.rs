//! Scene snapshot types for Lux.
//!
//! A `SceneSnapshot` is built once per scene load and then shared read-only
//! with the render core. Arrays are reference counted so the render thread
//! and in-flight dispatches can hold the same scene without copying it.

use std::sync::Arc;

use lux_math::Vec3;
use thiserror::Error;

use crate::texture::{Texture, TextureId};

/// Errors that can occur while assembling a scene.
#[derive(Error, Debug, PartialEq)]
pub enum SceneError {
    #[error("Shape {shape} references missing material {material}")]
    MissingMaterial { shape: usize, material: u32 },

    #[error("Material '{name}' references missing texture {texture}")]
    MissingTexture { name: String, texture: u32 },

    #[error("Environment references missing texture {0}")]
    MissingEnvironment(u32),

    #[error("Invalid shape {shape}: {reason}")]
    InvalidShape { shape: usize, reason: &'static str },
}

/// Index of a material inside a `SceneSnapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Base pose of the scene camera, before any orbit/zoom is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Camera position in world space
    pub position: Vec3,

    /// Viewing direction (unit length)
    pub direction: Vec3,

    /// Up vector (unit length)
    pub up: Vec3,

    /// Vertical field of view in degrees
    pub fov: f32,

    /// Distance from the camera to the image plane
    pub focal_distance: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 45.0,
            focal_distance: 1.0,
        }
    }
}

impl CameraPose {
    /// Pose looking from `position` towards `target`.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3, fov: f32) -> Self {
        let direction = (target - position).normalize();
        // Keep up perpendicular to the view direction for the base pose
        let right = direction.cross(up).normalize();
        Self {
            position,
            direction,
            up: right.cross(direction),
            fov,
            focal_distance: 1.0,
        }
    }
}

/// How a surface scatters light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialKind {
    /// Lambertian diffuse reflection
    Diffuse,
    /// Specular reflection with optional fuzz (0 = perfect mirror)
    Mirror { fuzz: f32 },
}

/// A surface material.
#[derive(Clone, Debug)]
pub struct Material {
    /// Material name (for diagnostics)
    pub name: String,

    /// Reflectance (RGB, 0-1)
    pub albedo: Vec3,

    /// Emitted radiance (RGB, for light-emitting surfaces)
    pub emission: Vec3,

    /// Scattering model
    pub kind: MaterialKind,

    /// Optional texture modulating the albedo
    pub texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec3::splat(0.5), // Grey default
            emission: Vec3::ZERO,
            kind: MaterialKind::Diffuse,
            texture: None,
        }
    }
}

impl Material {
    /// Create a diffuse material.
    pub fn diffuse(name: impl Into<String>, albedo: Vec3) -> Self {
        Self {
            name: name.into(),
            albedo,
            ..Default::default()
        }
    }

    /// Create a mirror-like material.
    pub fn mirror(name: impl Into<String>, albedo: Vec3, fuzz: f32) -> Self {
        Self {
            name: name.into(),
            albedo,
            kind: MaterialKind::Mirror {
                fuzz: fuzz.clamp(0.0, 1.0),
            },
            ..Default::default()
        }
    }

    /// Create an emissive material.
    pub fn emissive(name: impl Into<String>, emission: Vec3) -> Self {
        Self {
            name: name.into(),
            albedo: Vec3::ZERO,
            emission,
            ..Default::default()
        }
    }

    /// Set the albedo texture.
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Check if this material is emissive.
    pub fn is_emissive(&self) -> bool {
        self.emission.max_element() > 0.0
    }
}

/// Renderable primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere {
        center: Vec3,
        radius: f32,
        material: MaterialId,
    },
    /// Infinite plane through `point` facing `normal`
    Plane {
        point: Vec3,
        normal: Vec3,
        material: MaterialId,
    },
}

impl Shape {
    /// Material used by this shape.
    pub fn material(&self) -> MaterialId {
        match self {
            Shape::Sphere { material, .. } | Shape::Plane { material, .. } => *material,
        }
    }
}

/// What a ray sees when it escapes the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Environment {
    /// Vertical blend between two colors
    Gradient { horizon: Vec3, zenith: Vec3 },
    /// Latitude-longitude texture
    Map(TextureId),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Gradient {
            horizon: Vec3::new(1.0, 1.0, 1.0),
            zenith: Vec3::new(0.5, 0.7, 1.0),
        }
    }
}

/// Element counts of a scene, for logging and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCounts {
    pub shapes: usize,
    pub materials: usize,
    pub lights: usize,
    pub textures: usize,
}

/// An immutable scene shared with the render core.
///
/// Cloning is cheap: all arrays are reference counted.
#[derive(Clone, Debug)]
pub struct SceneSnapshot {
    /// Scene name (for logging)
    pub name: String,

    /// Base camera pose
    pub camera: CameraPose,

    shapes: Arc<[Shape]>,
    materials: Arc<[Material]>,
    lights: Arc<[u32]>,
    textures: Arc<[Texture]>,
    environment: Environment,
}

impl SceneSnapshot {
    /// All shapes.
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// All materials.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Indices into `shapes()` of emissive shapes.
    pub fn lights(&self) -> &[u32] {
        &self.lights
    }

    /// All textures.
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    /// Environment seen by escaping rays.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Get a material by ID.
    ///
    /// IDs are validated at build time, so this only fails for IDs from a
    /// different scene.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    /// Get a texture by ID.
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0 as usize)
    }

    /// Get shape count.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Get light count.
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// All element counts at once.
    pub fn counts(&self) -> SceneCounts {
        SceneCounts {
            shapes: self.shapes.len(),
            materials: self.materials.len(),
            lights: self.lights.len(),
            textures: self.textures.len(),
        }
    }
}

/// Incrementally assembles a `SceneSnapshot`.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    name: String,
    camera: CameraPose,
    shapes: Vec<Shape>,
    materials: Vec<Material>,
    textures: Vec<Texture>,
    environment: Environment,
}

impl SceneBuilder {
    /// Create an empty builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the base camera pose.
    pub fn with_camera(mut self, camera: CameraPose) -> Self {
        self.camera = camera;
        self
    }

    /// Set the environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Add a material to the scene and return its ID.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    /// Add a texture to the scene and return its ID.
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture);
        id
    }

    /// Add a sphere.
    pub fn add_sphere(&mut self, center: Vec3, radius: f32, material: MaterialId) -> &mut Self {
        self.shapes.push(Shape::Sphere {
            center,
            radius,
            material,
        });
        self
    }

    /// Add an infinite plane.
    pub fn add_plane(&mut self, point: Vec3, normal: Vec3, material: MaterialId) -> &mut Self {
        self.shapes.push(Shape::Plane {
            point,
            normal,
            material,
        });
        self
    }

    /// Validate references and freeze the scene.
    pub fn build(self) -> Result<SceneSnapshot, SceneError> {
        for material in &self.materials {
            if let Some(TextureId(texture)) = material.texture {
                if texture as usize >= self.textures.len() {
                    return Err(SceneError::MissingTexture {
                        name: material.name.clone(),
                        texture,
                    });
                }
            }
        }

        if let Environment::Map(TextureId(texture)) = self.environment {
            if texture as usize >= self.textures.len() {
                return Err(SceneError::MissingEnvironment(texture));
            }
        }

        let mut lights = Vec::new();
        for (index, shape) in self.shapes.iter().enumerate() {
            let MaterialId(material) = shape.material();
            let Some(mat) = self.materials.get(material as usize) else {
                return Err(SceneError::MissingMaterial {
                    shape: index,
                    material,
                });
            };

            match *shape {
                Shape::Sphere { radius, .. } if !(radius > 0.0) => {
                    return Err(SceneError::InvalidShape {
                        shape: index,
                        reason: "sphere radius must be positive",
                    });
                }
                Shape::Plane { normal, .. } if normal.length_squared() == 0.0 => {
                    return Err(SceneError::InvalidShape {
                        shape: index,
                        reason: "plane normal must be non-zero",
                    });
                }
                _ => {}
            }

            if mat.is_emissive() {
                lights.push(index as u32);
            }
        }

        log::debug!(
            "Built scene '{}': {} shapes, {} materials, {} lights, {} textures",
            self.name,
            self.shapes.len(),
            self.materials.len(),
            lights.len(),
            self.textures.len()
        );

        Ok(SceneSnapshot {
            name: self.name,
            camera: self.camera,
            shapes: self.shapes.into(),
            materials: self.materials.into(),
            lights: lights.into(),
            textures: self.textures.into(),
            environment: self.environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_collects_lights() {
        let mut builder = SceneBuilder::new("test");
        let grey = builder.add_material(Material::diffuse("grey", Vec3::splat(0.5)));
        let lamp = builder.add_material(Material::emissive("lamp", Vec3::splat(4.0)));

        builder
            .add_sphere(Vec3::ZERO, 1.0, grey)
            .add_sphere(Vec3::new(0.0, 3.0, 0.0), 0.5, lamp)
            .add_plane(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, grey);

        let scene = builder.build().unwrap();
        assert_eq!(scene.shape_count(), 3);
        assert_eq!(scene.lights(), &[1]);
        assert_eq!(
            scene.counts(),
            SceneCounts {
                shapes: 3,
                materials: 2,
                lights: 1,
                textures: 0
            }
        );
    }

    #[test]
    fn test_missing_material_is_rejected() {
        let mut builder = SceneBuilder::new("broken");
        builder.add_sphere(Vec3::ZERO, 1.0, MaterialId(7));

        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            SceneError::MissingMaterial {
                shape: 0,
                material: 7
            }
        );
    }

    #[test]
    fn test_missing_texture_is_rejected() {
        let mut builder = SceneBuilder::new("broken");
        builder.add_material(Material::diffuse("tex", Vec3::ONE).with_texture(TextureId(0)));

        assert!(matches!(
            builder.build(),
            Err(SceneError::MissingTexture { texture: 0, .. })
        ));
    }

    #[test]
    fn test_degenerate_sphere_is_rejected() {
        let mut builder = SceneBuilder::new("broken");
        let grey = builder.add_material(Material::default());
        builder.add_sphere(Vec3::ZERO, 0.0, grey);

        assert!(matches!(
            builder.build(),
            Err(SceneError::InvalidShape { shape: 0, .. })
        ));
    }

    #[test]
    fn test_snapshot_clone_shares_arrays() {
        let mut builder = SceneBuilder::new("shared");
        let grey = builder.add_material(Material::default());
        builder.add_sphere(Vec3::ZERO, 1.0, grey);
        let scene = builder.build().unwrap();

        let copy = scene.clone();
        assert!(std::ptr::eq(scene.shapes(), copy.shapes()));
    }

    #[test]
    fn test_look_at_pose_is_orthonormal() {
        let pose = CameraPose::look_at(Vec3::new(3.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y, 40.0);
        assert!((pose.direction.length() - 1.0).abs() < 1e-5);
        assert!((pose.up.length() - 1.0).abs() < 1e-5);
        assert!(pose.direction.dot(pose.up).abs() < 1e-5);
    }
}
