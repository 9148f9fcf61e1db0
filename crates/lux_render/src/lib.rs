//! Lux Render - progressive path tracing render core
//!
//! Each frame dispatches a radiance kernel over the image on a compute
//! device, adds the result into a running sum and copies the tone-mapped
//! average into a surface shared with presentation.
//!
//! - `RenderContext` owns a session and drives the frame loop
//! - `dispatch` maps the image onto the device grid (flat, grouped or
//!   persistent work claiming)
//! - `AccumulationBuffer` holds the per-pixel sums and iteration count
//! - `InteropSurface` hands the displayed frame to the presenter
//! - `FrameClock` tracks throughput and produces the status line
//!
//! # Example
//!
//! ```ignore
//! use lux_render::{RenderConfig, RenderContext};
//! use lux_math::OrbitTransform;
//!
//! let scene = lux_core::demo::three_spheres()?;
//! let mut ctx = RenderContext::new(RenderConfig::default(), scene)?;
//! for _ in 0..16 {
//!     ctx.render_frame(&OrbitTransform::IDENTITY);
//! }
//! let frame = ctx.capture()?;
//! ```

pub mod accumulation;
pub mod camera;
pub mod clock;
pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod interop;
pub mod kernel;

pub use accumulation::AccumulationBuffer;
pub use camera::{Camera, CameraRig};
pub use clock::FrameClock;
pub use config::{DeviceConfig, RenderConfig, SamplingConfig, TilingConfig};
pub use context::{CapturedFrame, FrameOutcome, RenderContext};
pub use device::{ComputeDevice, DeviceBuffer, DispatchHandle, DispatchReport, LaunchConfig};
pub use dispatch::{DispatchDescriptor, StrategyKind, Tile, TileKernel};
pub use error::{
    AllocationError, ConfigError, DispatchError, InteropError, RenderError, RenderResult,
};
pub use interop::{
    tone_map, InteropSurface, MappedSurface, PresentationGuard, PresentationHandle,
};
pub use kernel::{KernelBinding, PathTracer, PixelSample, RadianceKernel, ShadingMode};
