//! Lux Core - immutable scene data consumed by the render core.
//!
//! This crate provides:
//!
//! - **Scene types**: `SceneSnapshot`, `Shape`, `Material`, `Texture`
//! - **Construction**: `SceneBuilder`, which validates cross references and
//!   collects the light list
//! - **Demo content**: a small built-in scene used by the viewer
//!
//! # Example
//!
//! ```ignore
//! use lux_core::{Material, SceneBuilder};
//! use lux_math::Vec3;
//!
//! let mut builder = SceneBuilder::new("one sphere");
//! let grey = builder.add_material(Material::diffuse("grey", Vec3::splat(0.5)));
//! builder.add_sphere(Vec3::ZERO, 1.0, grey);
//! let scene = builder.build()?;
//! println!("{} shapes, {} lights", scene.shape_count(), scene.light_count());
//! ```

pub mod demo;
pub mod scene;
pub mod texture;

// Re-export commonly used types
pub use scene::{
    CameraPose, Environment, Material, MaterialId, MaterialKind, SceneBuilder, SceneCounts,
    SceneError, SceneSnapshot, Shape,
};
pub use texture::{Texture, TextureId};
