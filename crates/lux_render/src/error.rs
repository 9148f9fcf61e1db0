//! Error types for the render core.
//!
//! Allocation and configuration errors are fatal for the session and
//! propagate to the caller. Dispatch and interop errors are absorbed by the
//! render loop, which logs them and carries on with the next frame.

use thiserror::Error;

/// Device memory could not be reserved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Out of device memory for '{label}': {requested} bytes requested, {available} free")]
    OutOfMemory {
        label: &'static str,
        requested: usize,
        available: usize,
    },
}

/// A configuration value was rejected before any device work was issued.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Invalid {name} extent {x}x{y}")]
    InvalidExtent { name: &'static str, x: u32, y: u32 },

    #[error("Block of {lanes} lanes exceeds the limit of {limit}")]
    BlockTooLarge { lanes: u32, limit: u32 },

    #[error("Gamma must be positive and finite, got {0}")]
    InvalidGamma(f32),

    #[error("Field of view must be between 0 and 180 degrees, got {0}")]
    InvalidFov(f32),

    #[error("Samples per pixel must be at least 1")]
    InvalidSampleCount,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A compute launch reported an error after it finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Kernel '{label}' faulted: {message}")]
    KernelFault { label: &'static str, message: String },

    #[error("Kernel '{label}' was dropped before completing")]
    Lost { label: &'static str },

    #[error("Dispatch covers {dispatch:?} but the buffer is {buffer:?}")]
    ExtentMismatch { buffer: (u32, u32), dispatch: (u32, u32) },
}

/// The shared surface could not be used this frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteropError {
    #[error("Interop surface is lost")]
    SurfaceLost,

    #[error("Surface is {surface:?} but the image is {image:?}")]
    ExtentMismatch { surface: (u32, u32), image: (u32, u32) },

    #[error("Surface copy failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Errors that end the current render session.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start compute device: {0}")]
    Device(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
