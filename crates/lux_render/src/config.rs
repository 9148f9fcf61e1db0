//! Render configuration.
//!
//! Every field has a default, so a JSON file only needs to mention the
//! values it changes:
//!
//! ```json
//! { "width": 1280, "height": 720, "strategy": "persistent_claiming" }
//! ```

use std::path::Path;

use lux_math::UVec2;
use serde::{Deserialize, Serialize};

use crate::dispatch::StrategyKind;
use crate::error::ConfigError;
use crate::kernel::ShadingMode;

/// Upper bound on lanes per block, matching common GPU limits.
pub const MAX_BLOCK_LANES: u32 = 1024;

/// How the image is cut into tiles and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Lanes per block; also the tile size in pixels
    pub block: [u32; 2],
    /// Blocks per group for grouped tiling
    pub group: [u32; 2],
    /// Launch grid for persistent claiming
    pub persistent_grid: [u32; 2],
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            block: [32, 32],
            group: [4, 4],
            persistent_grid: [4, 4],
        }
    }
}

impl TilingConfig {
    pub fn block(&self) -> UVec2 {
        UVec2::from_array(self.block)
    }

    pub fn group(&self) -> UVec2 {
        UVec2::from_array(self.group)
    }

    pub fn persistent_grid(&self) -> UVec2 {
        UVec2::from_array(self.persistent_grid)
    }

    /// Check every extent is non-empty and blocks fit the lane limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, [x, y]) in [
            ("block", self.block),
            ("group", self.group),
            ("persistent grid", self.persistent_grid),
        ] {
            if x == 0 || y == 0 {
                return Err(ConfigError::InvalidExtent { name, x, y });
            }
        }

        let lanes = self.block[0].saturating_mul(self.block[1]);
        if lanes > MAX_BLOCK_LANES {
            return Err(ConfigError::BlockTooLarge {
                lanes,
                limit: MAX_BLOCK_LANES,
            });
        }

        Ok(())
    }
}

/// Per-frame sampling settings passed through to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Anti-aliasing samples taken per pixel per frame
    pub samples_per_pixel: u32,
    /// Maximum ray bounce depth
    pub max_depth: u32,
    /// What the kernel writes into the accumulation buffer
    pub shading: ShadingMode,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: 1,
            max_depth: 8,
            shading: ShadingMode::PathTrace,
        }
    }
}

/// Compute device settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Worker threads; 0 picks one per core
    pub threads: usize,
    /// Device memory budget in MiB
    pub memory_budget_mb: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            memory_budget_mb: 512,
        }
    }
}

impl DeviceConfig {
    /// Memory budget in bytes.
    pub fn memory_budget_bytes(&self) -> usize {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }
}

/// Top-level render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Initial image width in pixels
    pub width: u32,
    /// Initial image height in pixels
    pub height: u32,
    /// Workload partitioning strategy
    pub strategy: StrategyKind,
    pub tiling: TilingConfig,
    /// Display gamma applied when copying to the surface
    pub gamma: f32,
    pub sampling: SamplingConfig,
    pub device: DeviceConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            strategy: StrategyKind::FlatGrid,
            tiling: TilingConfig::default(),
            gamma: 1.0,
            sampling: SamplingConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl RenderConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loaded render config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Image extent as a vector.
    pub fn extent(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Reject anything the render core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_resolution(self.width, self.height)?;
        self.tiling.validate()?;
        validate_gamma(self.gamma)?;
        if self.sampling.samples_per_pixel == 0 {
            return Err(ConfigError::InvalidSampleCount);
        }
        Ok(())
    }
}

/// Resolutions must be non-empty in both axes.
pub fn validate_resolution(width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::InvalidResolution { width, height });
    }
    Ok(())
}

/// Gamma must be a positive, finite number.
pub fn validate_gamma(gamma: f32) -> Result<(), ConfigError> {
    if !(gamma.is_finite() && gamma > 0.0) {
        return Err(ConfigError::InvalidGamma(gamma));
    }
    Ok(())
}

/// Vertical field of view in degrees, strictly between 0 and 180.
pub fn validate_fov(fov: f32) -> Result<(), ConfigError> {
    if !(fov > 0.0 && fov < 180.0) {
        return Err(ConfigError::InvalidFov(fov));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiling.block(), UVec2::splat(32));
        assert_eq!(config.extent(), UVec2::new(640, 480));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RenderConfig::from_json_str(
            r#"{ "width": 320, "strategy": "grouped_tiling", "tiling": { "group": [2, 2] } }"#,
        )
        .unwrap();

        assert_eq!(config.width, 320);
        assert_eq!(config.height, 480);
        assert_eq!(config.strategy, StrategyKind::GroupedTiling);
        assert_eq!(config.tiling.group(), UVec2::splat(2));
        assert_eq!(config.tiling.block(), UVec2::splat(32));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let err = RenderConfig::from_json_str(r#"{ "height": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidResolution {
                width: 640,
                height: 0
            }
        ));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = RenderConfig::from_json_str(r#"{ "strategy": "round_robin" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_tiling_validation() {
        let mut tiling = TilingConfig::default();
        tiling.group = [0, 4];
        assert!(matches!(
            tiling.validate(),
            Err(ConfigError::InvalidExtent { name: "group", .. })
        ));

        let mut tiling = TilingConfig::default();
        tiling.block = [64, 32];
        assert!(matches!(
            tiling.validate(),
            Err(ConfigError::BlockTooLarge { lanes: 2048, .. })
        ));
    }

    #[test]
    fn test_gamma_validation() {
        assert!(validate_gamma(2.2).is_ok());
        assert!(validate_gamma(0.0).is_err());
        assert!(validate_gamma(-1.0).is_err());
        assert!(validate_gamma(f32::NAN).is_err());
        assert!(validate_gamma(f32::INFINITY).is_err());
    }

    #[test]
    fn test_fov_validation() {
        assert!(validate_fov(45.0).is_ok());
        assert!(validate_fov(179.9).is_ok());
        assert!(matches!(validate_fov(0.0), Err(ConfigError::InvalidFov(_))));
        assert!(validate_fov(180.0).is_err());
        assert!(validate_fov(-30.0).is_err());
        assert!(validate_fov(f32::NAN).is_err());
    }
}
