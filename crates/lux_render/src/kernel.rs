//! Per-pixel radiance kernels.
//!
//! The render core treats the kernel as opaque: it hands over the scene,
//! the frame's camera and a seeded RNG and gets back one radiance sample.
//! `PathTracer` is the reference implementation: Monte Carlo path tracing
//! over spheres and planes with diffuse, mirror and emissive materials.

use std::fmt;
use std::sync::Arc;

use lux_core::{Environment, Material, MaterialKind, SceneSnapshot, Shape};
use lux_math::{Interval, Ray, UVec2, Vec3};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::config::SamplingConfig;

/// What the kernel writes into the accumulation buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingMode {
    /// Full path tracing
    #[default]
    PathTrace,
    /// First-hit surface normal mapped to [0, 1]
    Normals,
    /// First-hit albedo, no lighting
    Albedo,
}

/// Computes one radiance sample for a pixel.
pub trait RadianceKernel: Send + Sync {
    fn radiance(
        &self,
        scene: &SceneSnapshot,
        camera: &Camera,
        sample: PixelSample,
        sampling: &SamplingConfig,
        rng: &mut dyn RngCore,
    ) -> Vec3;
}

/// Location of a sample on the image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    pub pixel: UVec2,
    pub image: UVec2,
    /// Sub-pixel offset in [0, 1)
    pub jitter: (f32, f32),
}

impl PixelSample {
    /// Normalized image-plane coordinates in [-1, 1], +y up.
    pub fn ndc(&self) -> (f32, f32) {
        let x = (self.pixel.x as f32 + self.jitter.0) / self.image.x as f32;
        let y = (self.pixel.y as f32 + self.jitter.1) / self.image.y as f32;
        (2.0 * x - 1.0, 1.0 - 2.0 * y)
    }
}

/// A scene, a kernel and the sampling settings, bound for dispatch.
#[derive(Clone)]
pub struct KernelBinding {
    pub scene: Arc<SceneSnapshot>,
    pub kernel: Arc<dyn RadianceKernel>,
    pub sampling: SamplingConfig,
}

impl fmt::Debug for KernelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelBinding")
            .field("scene", &self.scene.name)
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl KernelBinding {
    pub fn new(
        scene: Arc<SceneSnapshot>,
        kernel: Arc<dyn RadianceKernel>,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            scene,
            kernel,
            sampling,
        }
    }

    /// Average of `samples_per_pixel` jittered samples for one pixel.
    pub fn shade_pixel(
        &self,
        camera: &Camera,
        pixel: UVec2,
        image: UVec2,
        rng: &mut dyn RngCore,
    ) -> Vec3 {
        let samples = self.sampling.samples_per_pixel.max(1);
        let mut sum = Vec3::ZERO;
        for _ in 0..samples {
            let sample = PixelSample {
                pixel,
                image,
                jitter: (rng.gen::<f32>(), rng.gen::<f32>()),
            };
            sum += self
                .kernel
                .radiance(&self.scene, camera, sample, &self.sampling, rng);
        }
        sanitize(sum / samples as f32)
    }
}

/// Replace non-finite or negative components with zero.
#[inline]
pub fn sanitize(color: Vec3) -> Vec3 {
    let clean = |c: f32| if c.is_finite() { c.max(0.0) } else { 0.0 };
    Vec3::new(clean(color.x), clean(color.y), clean(color.z))
}

/// Surface interaction found by `trace`.
#[derive(Debug, Clone, Copy)]
struct Hit<'a> {
    t: f32,
    point: Vec3,
    /// Faces against the incoming ray
    normal: Vec3,
    u: f32,
    v: f32,
    material: &'a Material,
}

/// Reference Monte Carlo path tracer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathTracer;

impl RadianceKernel for PathTracer {
    fn radiance(
        &self,
        scene: &SceneSnapshot,
        camera: &Camera,
        sample: PixelSample,
        sampling: &SamplingConfig,
        rng: &mut dyn RngCore,
    ) -> Vec3 {
        let ray = camera.ray(sample.ndc());

        match sampling.shading {
            ShadingMode::PathTrace => trace_path(scene, ray, sampling.max_depth, rng),
            ShadingMode::Normals => trace(scene, &ray)
                .map(|hit| 0.5 * (hit.normal + Vec3::ONE))
                .unwrap_or(Vec3::ZERO),
            ShadingMode::Albedo => match trace(scene, &ray) {
                Some(hit) if hit.material.is_emissive() => hit.material.emission,
                Some(hit) => surface_albedo(scene, &hit),
                None => environment(scene, &ray),
            },
        }
    }
}

fn trace_path(scene: &SceneSnapshot, mut ray: Ray, max_depth: u32, rng: &mut dyn RngCore) -> Vec3 {
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;

    for _ in 0..max_depth {
        let Some(hit) = trace(scene, &ray) else {
            return radiance + throughput * environment(scene, &ray);
        };

        radiance += throughput * hit.material.emission;

        let direction = match hit.material.kind {
            MaterialKind::Diffuse => {
                let d = hit.normal + random_unit_vector(rng);
                if d.length_squared() < 1e-8 {
                    hit.normal
                } else {
                    d
                }
            }
            MaterialKind::Mirror { fuzz } => {
                let d = reflect(ray.direction, hit.normal) + fuzz * random_unit_vector(rng);
                if d.dot(hit.normal) <= 0.0 {
                    // Absorbed
                    return radiance;
                }
                d
            }
        };

        throughput *= surface_albedo(scene, &hit);
        if throughput.max_element() <= 0.0 {
            return radiance;
        }
        ray = Ray::new(hit.point, direction.normalize());
    }

    radiance
}

fn trace<'a>(scene: &'a SceneSnapshot, ray: &Ray) -> Option<Hit<'a>> {
    let mut range = Interval::FORWARD;
    let mut closest = None;

    for shape in scene.shapes() {
        let Some(material) = scene.material(shape.material()) else {
            continue;
        };
        if let Some(hit) = intersect(shape, material, ray, range) {
            range = range.with_max(hit.t);
            closest = Some(hit);
        }
    }
    closest
}

fn intersect<'a>(
    shape: &Shape,
    material: &'a Material,
    ray: &Ray,
    range: Interval,
) -> Option<Hit<'a>> {
    match *shape {
        Shape::Sphere { center, radius, .. } => {
            let oc = center - ray.origin;
            let a = ray.direction.length_squared();
            let h = ray.direction.dot(oc);
            let c = oc.length_squared() - radius * radius;
            let discriminant = h * h - a * c;
            if discriminant < 0.0 {
                return None;
            }

            let sqrtd = discriminant.sqrt();
            let mut t = (h - sqrtd) / a;
            if !range.surrounds(t) {
                t = (h + sqrtd) / a;
                if !range.surrounds(t) {
                    return None;
                }
            }

            let point = ray.at(t);
            let outward = (point - center) / radius;
            let (u, v) = sphere_uv(outward);
            Some(Hit {
                t,
                point,
                normal: face_forward(outward, ray.direction),
                u,
                v,
                material,
            })
        }
        Shape::Plane { point: origin, normal, .. } => {
            let normal = normal.normalize();
            let denom = normal.dot(ray.direction);
            if denom.abs() < 1e-8 {
                return None;
            }
            let t = (origin - ray.origin).dot(normal) / denom;
            if !range.surrounds(t) {
                return None;
            }

            let point = ray.at(t);
            let (tangent, bitangent) = normal.any_orthonormal_pair();
            let local = point - origin;
            Some(Hit {
                t,
                point,
                normal: face_forward(normal, ray.direction),
                // One texture repeat per 4 units
                u: local.dot(tangent) * 0.25,
                v: local.dot(bitangent) * 0.25,
                material,
            })
        }
    }
}

fn face_forward(normal: Vec3, direction: Vec3) -> Vec3 {
    if normal.dot(direction) < 0.0 {
        normal
    } else {
        -normal
    }
}

/// Latitude-longitude coordinates of a unit vector.
fn sphere_uv(p: Vec3) -> (f32, f32) {
    use std::f32::consts::PI;
    let theta = (-p.y).clamp(-1.0, 1.0).acos();
    let phi = (-p.z).atan2(p.x) + PI;
    (phi / (2.0 * PI), theta / PI)
}

fn surface_albedo(scene: &SceneSnapshot, hit: &Hit<'_>) -> Vec3 {
    match hit.material.texture.and_then(|id| scene.texture(id)) {
        Some(texture) => hit.material.albedo * texture.sample(hit.u, hit.v),
        None => hit.material.albedo,
    }
}

fn environment(scene: &SceneSnapshot, ray: &Ray) -> Vec3 {
    let direction = ray.direction.normalize();
    match scene.environment() {
        Environment::Gradient { horizon, zenith } => {
            let a = 0.5 * (direction.y + 1.0);
            horizon * (1.0 - a) + zenith * a
        }
        Environment::Map(id) => {
            let (u, v) = sphere_uv(direction);
            scene
                .texture(id)
                .map(|texture| texture.sample(u, v))
                .unwrap_or(Vec3::ZERO)
        }
    }
}

fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

fn random_unit_vector(rng: &mut dyn RngCore) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let len_sq = p.length_squared();
        if 1e-30 < len_sq && len_sq <= 1.0 {
            return p / len_sq.sqrt();
        }
    }
}
