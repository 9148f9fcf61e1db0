//! Texel storage for materials and environment maps.
//!
//! Textures are plain linear-RGB arrays; loading them from disk is the job
//! of whatever builds the scene.

use lux_math::Vec3;

/// Index of a texture inside a `SceneSnapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// A texture with linear RGB texels.
#[derive(Clone, Debug)]
pub struct Texture {
    /// Texture width in pixels
    pub width: u32,

    /// Texture height in pixels
    pub height: u32,

    /// Texels in row-major order, top row first
    pub texels: Vec<Vec3>,
}

impl Texture {
    /// Create a texture from texel data.
    ///
    /// Returns `None` if the texel count does not match the dimensions.
    pub fn new(width: u32, height: u32, texels: Vec<Vec3>) -> Option<Self> {
        if width == 0 || height == 0 || texels.len() != (width * height) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            texels,
        })
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Create a two-color checkerboard with `cells` squares per side.
    pub fn checker(cells: u32, a: Vec3, b: Vec3) -> Self {
        let cells = cells.max(1);
        let texels = (0..cells * cells)
            .map(|i| if (i % cells + i / cells) % 2 == 0 { a } else { b })
            .collect();
        Self {
            width: cells,
            height: cells,
            texels,
        }
    }

    /// Sample the texture at UV coordinates (nearest texel, wrapping).
    ///
    /// (0, 0) is the bottom-left corner.
    pub fn sample(&self, u: f32, v: f32) -> Vec3 {
        let u = u.rem_euclid(1.0);
        let v = v.rem_euclid(1.0);

        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = (((1.0 - v) * self.height as f32) as u32).min(self.height - 1);

        self.texels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(Vec3::ZERO)
    }

    /// Get total size in bytes (approximate).
    pub fn size_bytes(&self) -> usize {
        self.texels.len() * std::mem::size_of::<Vec3>()
    }
}
