//! Built-in demo content.
//!
//! Scene files are loaded elsewhere; this scene exists so the viewer and
//! benchmarks have something to trace.

use lux_math::Vec3;

use crate::scene::{CameraPose, Environment, Material, SceneBuilder, SceneError, SceneSnapshot};
use crate::texture::Texture;

/// Three spheres on a checkered ground plane, lit by the sky and one lamp.
pub fn three_spheres() -> Result<SceneSnapshot, SceneError> {
    let camera = CameraPose::look_at(
        Vec3::new(0.0, 1.5, 6.0),
        Vec3::new(0.0, 0.6, 0.0),
        Vec3::Y,
        40.0,
    );

    let mut builder = SceneBuilder::new("three spheres")
        .with_camera(camera)
        .with_environment(Environment::default());

    let checker = builder.add_texture(Texture::checker(
        16,
        Vec3::new(0.8, 0.8, 0.8),
        Vec3::new(0.2, 0.3, 0.1),
    ));

    let ground = builder.add_material(Material::diffuse("ground", Vec3::ONE).with_texture(checker));
    let brown = builder.add_material(Material::diffuse("brown", Vec3::new(0.4, 0.2, 0.1)));
    let chrome = builder.add_material(Material::mirror("chrome", Vec3::new(0.7, 0.6, 0.5), 0.05));
    let blue = builder.add_material(Material::diffuse("blue", Vec3::new(0.1, 0.2, 0.5)));
    let lamp = builder.add_material(Material::emissive("lamp", Vec3::splat(6.0)));

    builder
        .add_plane(Vec3::ZERO, Vec3::Y, ground)
        .add_sphere(Vec3::new(-1.6, 0.7, 0.0), 0.7, brown)
        .add_sphere(Vec3::new(0.0, 0.8, -0.4), 0.8, chrome)
        .add_sphere(Vec3::new(1.6, 0.6, 0.3), 0.6, blue)
        .add_sphere(Vec3::new(0.0, 4.0, 1.0), 0.5, lamp);

    builder.build()
}
