//! The render context: everything one render session owns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lux_core::SceneSnapshot;
use lux_math::{OrbitTransform, UVec2, Vec3};

use crate::accumulation::AccumulationBuffer;
use crate::camera::CameraRig;
use crate::clock::FrameClock;
use crate::config::{validate_fov, validate_gamma, validate_resolution, RenderConfig};
use crate::device::ComputeDevice;
use crate::dispatch::{DispatchDescriptor, StrategyKind};
use crate::error::{AllocationError, ConfigError, DispatchError, InteropError, RenderResult};
use crate::interop::{color_to_rgba, InteropSurface, PresentationHandle};
use crate::kernel::{KernelBinding, PathTracer, RadianceKernel, ShadingMode};

/// What happened during one `render_frame`.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Iteration count after this frame
    pub iteration: u32,
    /// Set when the accumulate dispatch faulted; the frame still counts
    pub dispatch_error: Option<DispatchError>,
    /// Whether the surface received this frame
    pub displayed: bool,
    /// New status line, when a reporting interval completed
    pub status: Option<String>,
    pub elapsed: Duration,
}

/// A host copy of the displayed image.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// Display values, row-major, top row first
    pub pixels: Vec<Vec3>,
}

impl CapturedFrame {
    /// Pack into 8-bit RGBA.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&c| color_to_rgba(c)).collect()
    }
}

/// One render session: device, scene binding, buffers and statistics.
///
/// Frames are rendered strictly one after another; every operation takes
/// `&mut self`.
pub struct RenderContext {
    config: RenderConfig,
    rig: CameraRig,
    binding: KernelBinding,
    descriptor: DispatchDescriptor,
    accumulation: AccumulationBuffer,
    surface: InteropSurface,
    clock: FrameClock,
    status: String,
    device: ComputeDevice,
}

impl RenderContext {
    /// Start a session rendering `scene` with the reference path tracer.
    pub fn new(config: RenderConfig, scene: SceneSnapshot) -> RenderResult<Self> {
        Self::with_kernel(config, scene, Arc::new(PathTracer))
    }

    /// Start a session with a custom radiance kernel.
    pub fn with_kernel(
        config: RenderConfig,
        scene: SceneSnapshot,
        kernel: Arc<dyn RadianceKernel>,
    ) -> RenderResult<Self> {
        config.validate()?;

        let device = ComputeDevice::new(&config.device)?;
        let extent = config.extent();
        let accumulation = AccumulationBuffer::allocate(&device, extent.x, extent.y)?;
        let surface = InteropSurface::new(&device, extent.x, extent.y)?;

        let counts = scene.counts();
        log::info!(
            "Render context for '{}' at {}x{}: {} shapes, {} lights, {} strategy",
            scene.name,
            extent.x,
            extent.y,
            counts.shapes,
            counts.lights,
            config.strategy
        );

        let rig = CameraRig::new(scene.camera, extent);
        let binding = KernelBinding::new(Arc::new(scene), kernel, config.sampling);
        let descriptor = DispatchDescriptor::for_image(config.strategy, extent, &config.tiling);

        Ok(Self {
            config,
            rig,
            binding,
            descriptor,
            accumulation,
            surface,
            clock: FrameClock::new(),
            status: String::new(),
            device,
        })
    }

    /// Render one progressive frame.
    ///
    /// Accumulates one sample per pixel, then copies the tone-mapped image
    /// into the surface. Dispatch and surface failures are logged and
    /// reported in the outcome; the loop carries on with the next frame.
    pub fn render_frame(&mut self, orbit: &OrbitTransform) -> FrameOutcome {
        let started = Instant::now();
        let camera = self.rig.frame(orbit);

        let dispatch_error = self
            .accumulation
            .accumulate(&self.device, &self.descriptor, &camera, &self.binding)
            .err();
        if let Some(err) = &dispatch_error {
            log::warn!("{err}");
        }

        let gamma = self.config.gamma;
        let displayed = match self.surface.acquire() {
            Ok(mut mapped) => match mapped.write_frame(&self.device, &self.accumulation, gamma) {
                Ok(_) => true,
                Err(err) => {
                    log::warn!("Skipping display write: {err}");
                    false
                }
            },
            Err(err) => {
                log::warn!("Skipping display write: {err}");
                false
            }
        };

        let elapsed = started.elapsed();
        let iteration = self.accumulation.iteration_count();
        let status = self.clock.record_frame(elapsed, iteration).map(|_| {
            self.status = self.clock.status_line();
            log::debug!("{}", self.status);
            self.status.clone()
        });

        FrameOutcome {
            iteration,
            dispatch_error,
            displayed,
            status,
            elapsed,
        }
    }

    /// Discard everything accumulated so far.
    pub fn restart(&mut self) {
        self.accumulation.reset(&self.device);
        self.clock.restart();
    }

    /// Change the image size. Returns `false` if the size is unchanged.
    ///
    /// Both device buffers are reallocated, so the image restarts from zero.
    /// If the new size does not fit, both buffers go back to the old size
    /// and the error is returned.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<bool> {
        validate_resolution(width, height)?;
        let extent = UVec2::new(width, height);
        if extent == self.extent() && extent == self.surface.extent() {
            return Ok(false);
        }

        if let Err(err) = self.reallocate_buffers(extent) {
            // The descriptor still describes the committed size
            let previous = self.descriptor.image;
            log::error!(
                "Resize to {}x{} failed, restoring {}x{}: {err}",
                width,
                height,
                previous.x,
                previous.y
            );
            // Both buffers were released, so the old size fits again
            self.reallocate_buffers(previous)?;
            self.clock.restart();
            return Err(err.into());
        }

        self.rig.resize(extent);
        self.descriptor =
            DispatchDescriptor::for_image(self.config.strategy, extent, &self.config.tiling);
        self.config.width = width;
        self.config.height = height;
        self.clock.restart();

        log::info!("Resized to {}x{}", width, height);
        Ok(true)
    }

    fn reallocate_buffers(&mut self, extent: UVec2) -> Result<(), AllocationError> {
        self.accumulation.reallocate(&self.device, extent.x, extent.y)?;
        self.surface.reallocate(&self.device, extent.x, extent.y)
    }

    /// Replace the scene. The camera returns to the new scene's base pose.
    pub fn load_scene(&mut self, scene: SceneSnapshot) {
        log::info!("Loading scene '{}'", scene.name);
        self.rig.set_base(scene.camera, self.extent());
        self.binding.scene = Arc::new(scene);
        self.restart();
    }

    /// Switch partitioning strategy. The accumulated image is kept.
    pub fn set_strategy(&mut self, strategy: StrategyKind) {
        if strategy == self.config.strategy {
            return;
        }
        self.config.strategy = strategy;
        self.descriptor =
            DispatchDescriptor::for_image(strategy, self.extent(), &self.config.tiling);
        log::info!("Dispatch strategy: {}", strategy);
    }

    /// Change display gamma; applies from the next frame.
    pub fn set_gamma(&mut self, gamma: f32) -> Result<(), ConfigError> {
        validate_gamma(gamma)?;
        self.config.gamma = gamma;
        Ok(())
    }

    /// Change what the kernel computes. Restarts accumulation.
    pub fn set_shading(&mut self, shading: ShadingMode) {
        self.config.sampling.shading = shading;
        self.binding.sampling.shading = shading;
        self.restart();
    }

    /// Change the vertical field of view in degrees. Restarts accumulation.
    pub fn set_fov(&mut self, fov: f32) -> Result<(), ConfigError> {
        validate_fov(fov)?;
        self.rig.set_fov(fov, self.extent());
        self.restart();
        Ok(())
    }

    /// Presentation side of the shared surface.
    pub fn presentation(&self) -> PresentationHandle {
        self.surface.presentation()
    }

    /// Read back the displayed image.
    pub fn capture(&self) -> Result<CapturedFrame, InteropError> {
        let guard = self.surface.presentation().acquire_read()?;
        let extent = guard.extent();
        Ok(CapturedFrame {
            width: extent.x,
            height: extent.y,
            pixels: guard.pixels(),
        })
    }

    /// Last status line; empty until the first reporting interval completes.
    pub fn status_line(&self) -> &str {
        &self.status
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn device(&self) -> &ComputeDevice {
        &self.device
    }

    pub fn extent(&self) -> UVec2 {
        self.accumulation.extent()
    }

    pub fn iteration_count(&self) -> u32 {
        self.accumulation.iteration_count()
    }

    pub fn accumulation(&self) -> &AccumulationBuffer {
        &self.accumulation
    }

    pub fn descriptor(&self) -> &DispatchDescriptor {
        &self.descriptor
    }

    pub fn camera_rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn scene(&self) -> &SceneSnapshot {
        &self.binding.scene
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        log::info!(
            "Render context shut down after {} frames ({} bytes still held)",
            self.clock.frame_count(),
            self.device.memory_in_use()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::config::{DeviceConfig, SamplingConfig};
    use crate::error::RenderError;
    use crate::kernel::PixelSample;
    use lux_core::SceneBuilder;
    use rand::RngCore;

    fn small_config() -> RenderConfig {
        RenderConfig {
            width: 64,
            height: 48,
            sampling: SamplingConfig {
                max_depth: 2,
                ..Default::default()
            },
            device: DeviceConfig {
                threads: 2,
                memory_budget_mb: 8,
            },
            ..Default::default()
        }
    }

    fn empty_scene() -> SceneSnapshot {
        SceneBuilder::new("empty").build().unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_before_device_work() {
        let config = RenderConfig {
            gamma: 0.0,
            ..small_config()
        };
        let err = RenderContext::new(config, empty_scene()).err().unwrap();
        assert!(matches!(err, RenderError::Config(ConfigError::InvalidGamma(_))));
    }

    #[test]
    fn test_render_frame_advances() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);

        assert_eq!(outcome.iteration, 1);
        assert!(outcome.displayed);
        assert!(outcome.dispatch_error.is_none());
        // The first frame always completes a reporting interval
        assert!(outcome.status.is_some());
        assert!(ctx.status_line().contains("Iteration 1"));
    }

    #[test]
    fn test_resize_is_noop_when_unchanged() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);

        assert!(!ctx.resize(64, 48).unwrap());
        assert_eq!(ctx.iteration_count(), 1);

        assert!(ctx.resize(32, 32).unwrap());
        assert_eq!(ctx.iteration_count(), 0);
        assert_eq!(ctx.extent(), UVec2::new(32, 32));
        assert_eq!(ctx.descriptor().block_count, UVec2::ONE);
        assert_eq!(ctx.device().memory_in_use(), 2 * 32 * 32 * 12);

        assert!(matches!(
            ctx.resize(0, 10),
            Err(RenderError::Config(ConfigError::InvalidResolution { .. }))
        ));
    }

    #[test]
    fn test_restart_and_load_scene_reset() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);
        ctx.render_frame(&OrbitTransform::IDENTITY);
        assert_eq!(ctx.iteration_count(), 2);

        ctx.restart();
        assert_eq!(ctx.iteration_count(), 0);

        ctx.render_frame(&OrbitTransform::IDENTITY);
        ctx.load_scene(lux_core::demo::three_spheres().unwrap());
        assert_eq!(ctx.iteration_count(), 0);
        assert_eq!(ctx.scene().shape_count(), 5);
        assert_eq!(ctx.camera_rig().base().position, ctx.scene().camera.position);
    }

    #[test]
    fn test_strategy_switch_keeps_accumulation() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);
        ctx.set_strategy(StrategyKind::PersistentClaiming);
        ctx.render_frame(&OrbitTransform::IDENTITY);

        assert_eq!(ctx.iteration_count(), 2);
        assert_eq!(ctx.descriptor().kind, StrategyKind::PersistentClaiming);
    }

    #[test]
    fn test_gamma_validation() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        assert!(ctx.set_gamma(2.2).is_ok());
        assert_eq!(ctx.config().gamma, 2.2);
        assert!(ctx.set_gamma(f32::NAN).is_err());
        assert_eq!(ctx.config().gamma, 2.2);
    }

    #[test]
    fn test_lost_surface_skips_display() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.presentation().mark_lost();

        let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);
        assert!(!outcome.displayed);
        assert_eq!(outcome.iteration, 1);
        assert!(matches!(ctx.capture(), Err(InteropError::SurfaceLost)));
    }

    #[test]
    fn test_capture_shows_environment() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);

        let frame = ctx.capture().unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.to_rgba8().len(), 64 * 48 * 4);
        // Sky gradient: the top row is bluer than the bottom row
        let top = frame.pixels[32];
        let bottom = frame.pixels[47 * 64 + 32];
        assert!(top.x < bottom.x);
    }

    #[test]
    fn test_failed_resize_keeps_old_size() {
        let config = RenderConfig {
            width: 256,
            height: 256,
            device: DeviceConfig {
                threads: 2,
                memory_budget_mb: 4,
            },
            ..small_config()
        };
        let mut ctx = RenderContext::new(config, empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);

        // The accumulation buffer fits at 512x400 but the surface does not
        for _ in 0..2 {
            let err = ctx.resize(512, 400).unwrap_err();
            assert!(matches!(
                err,
                RenderError::Allocation(AllocationError::OutOfMemory {
                    label: "interop surface",
                    ..
                })
            ));
            assert_eq!(ctx.extent(), UVec2::new(256, 256));
            assert_eq!(ctx.descriptor().image, UVec2::new(256, 256));
            assert_eq!((ctx.config().width, ctx.config().height), (256, 256));
            assert_eq!(ctx.device().memory_in_use(), 2 * 256 * 256 * 12);
        }

        assert_eq!(ctx.iteration_count(), 0);
        let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);
        assert!(outcome.displayed);
        assert!(outcome.dispatch_error.is_none());
        assert_eq!(ctx.capture().unwrap().pixels.len(), 256 * 256);
    }

    #[test]
    fn test_faulting_kernel_still_displays() {
        struct FaultyRows;
        impl RadianceKernel for FaultyRows {
            fn radiance(
                &self,
                _scene: &SceneSnapshot,
                _camera: &Camera,
                sample: PixelSample,
                _sampling: &SamplingConfig,
                _rng: &mut dyn RngCore,
            ) -> Vec3 {
                if sample.pixel.y >= 32 {
                    panic!("bad row");
                }
                Vec3::ONE
            }
        }

        let mut ctx =
            RenderContext::with_kernel(small_config(), empty_scene(), Arc::new(FaultyRows))
                .unwrap();

        for n in 1..=2 {
            let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);
            assert!(matches!(
                outcome.dispatch_error,
                Some(DispatchError::KernelFault {
                    label: "accumulate",
                    ..
                })
            ));
            assert!(outcome.displayed);
            assert_eq!(outcome.iteration, n);
        }

        // Tiles in the healthy rows kept their samples
        let frame = ctx.capture().unwrap();
        assert_eq!(frame.pixels[0], Vec3::ONE);
    }

    #[test]
    fn test_fov_validation() {
        let mut ctx = RenderContext::new(small_config(), empty_scene()).unwrap();
        ctx.render_frame(&OrbitTransform::IDENTITY);

        let before = ctx.camera_rig().half_extents();
        for fov in [f32::NAN, 0.0, -10.0, 180.0, 270.0] {
            assert!(matches!(ctx.set_fov(fov), Err(ConfigError::InvalidFov(_))));
        }
        assert_eq!(ctx.camera_rig().half_extents(), before);
        assert_eq!(ctx.iteration_count(), 1);

        ctx.set_fov(90.0).unwrap();
        assert_eq!(ctx.iteration_count(), 0);
        // tan(45 degrees) = 1
        let (_, half_height) = ctx.camera_rig().half_extents();
        assert!((half_height - ctx.scene().camera.focal_distance).abs() < 1e-4);
    }
}
