//! End-to-end frame loop tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use lux_core::{SceneBuilder, SceneSnapshot};
use lux_math::{OrbitTransform, Quat, UVec2, Vec3};
use lux_render::{
    Camera, ComputeDevice, DeviceConfig, PixelSample, RadianceKernel, RenderConfig, RenderContext,
    SamplingConfig, StrategyKind,
};
use rand::RngCore;

/// Returns 1 for every sample and counts how many it produced.
#[derive(Default)]
struct CountingKernel {
    samples: AtomicU32,
}

impl RadianceKernel for CountingKernel {
    fn radiance(
        &self,
        _scene: &SceneSnapshot,
        _camera: &Camera,
        _sample: PixelSample,
        _sampling: &SamplingConfig,
        _rng: &mut dyn RngCore,
    ) -> Vec3 {
        self.samples.fetch_add(1, Ordering::Relaxed);
        Vec3::ONE
    }
}

fn config(width: u32, height: u32, strategy: StrategyKind) -> RenderConfig {
    RenderConfig {
        width,
        height,
        strategy,
        device: DeviceConfig {
            threads: 4,
            memory_budget_mb: 64,
        },
        ..Default::default()
    }
}

fn empty_scene() -> SceneSnapshot {
    SceneBuilder::new("empty").build().unwrap()
}

#[test]
fn test_flat_grid_640x480_touches_every_pixel_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let kernel = Arc::new(CountingKernel::default());
    let config = config(640, 480, StrategyKind::FlatGrid);
    let mut ctx = RenderContext::with_kernel(config, empty_scene(), kernel.clone()).unwrap();
    assert_eq!(ctx.descriptor().grid, UVec2::new(20, 15));
    assert_eq!(ctx.iteration_count(), 0);

    let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);

    assert_eq!(outcome.iteration, 1);
    assert_eq!(kernel.samples.load(Ordering::Relaxed), 640 * 480);
    assert!(ctx.accumulation().snapshot().iter().all(|&v| v == Vec3::ONE));

    let frame = ctx.capture().unwrap();
    assert!(frame.pixels.iter().all(|&p| p == Vec3::ONE));
}

#[test]
fn test_all_strategies_agree() {
    for strategy in StrategyKind::ALL {
        let kernel = Arc::new(CountingKernel::default());
        let config = config(301, 177, strategy);
        let mut ctx = RenderContext::with_kernel(config, empty_scene(), kernel.clone()).unwrap();

        for _ in 0..3 {
            ctx.render_frame(&OrbitTransform::IDENTITY);
        }

        assert_eq!(ctx.iteration_count(), 3, "{strategy}");
        assert_eq!(kernel.samples.load(Ordering::Relaxed), 3 * 301 * 177, "{strategy}");
        assert!(
            ctx.accumulation().snapshot().iter().all(|&v| v == Vec3::splat(3.0)),
            "{strategy}"
        );
    }
}

#[test]
fn test_progressive_demo_render() {
    let mut ctx = RenderContext::new(
        RenderConfig {
            sampling: SamplingConfig {
                max_depth: 3,
                ..Default::default()
            },
            ..config(96, 64, StrategyKind::PersistentClaiming)
        },
        lux_core::demo::three_spheres().unwrap(),
    )
    .unwrap();

    let orbit = OrbitTransform::from_quat(Quat::from_rotation_y(0.3), 1.2);
    for n in 1..=4 {
        let outcome = ctx.render_frame(&orbit);
        assert_eq!(outcome.iteration, n);
        assert!(outcome.displayed);
        assert!(outcome.dispatch_error.is_none());
    }

    let frame = ctx.capture().unwrap();
    assert!(frame.pixels.iter().all(|p| p.is_finite() && p.min_element() >= 0.0));
    assert!(frame.pixels.iter().any(|p| p.max_element() > 0.0));
}

#[test]
fn test_camera_move_then_restart() {
    let config = config(32, 32, StrategyKind::GroupedTiling);
    let mut ctx = RenderContext::new(config, empty_scene()).unwrap();
    ctx.render_frame(&OrbitTransform::IDENTITY);
    ctx.render_frame(&OrbitTransform::IDENTITY);

    // Moving the camera does not reset by itself
    ctx.render_frame(&OrbitTransform::from_quat(Quat::from_rotation_x(0.2), 1.0));
    assert_eq!(ctx.iteration_count(), 3);

    ctx.restart();
    let outcome = ctx.render_frame(&OrbitTransform::from_quat(Quat::from_rotation_x(0.2), 1.0));
    assert_eq!(outcome.iteration, 1);
}

#[test]
fn test_resize_reallocates_within_budget() {
    let mut ctx = RenderContext::new(
        RenderConfig {
            device: DeviceConfig {
                threads: 2,
                memory_budget_mb: 4,
            },
            ..config(256, 256, StrategyKind::FlatGrid)
        },
        empty_scene(),
    )
    .unwrap();

    // Two 256x256 buffers use 1.5 MiB. Two 400x400 buffers need ~3.7 MiB,
    // which only fits because the old buffers are released first.
    assert!(ctx.resize(400, 400).unwrap());
    let outcome = ctx.render_frame(&OrbitTransform::IDENTITY);
    assert!(outcome.displayed);
    assert_eq!(ctx.capture().unwrap().pixels.len(), 400 * 400);

    // Too large for the budget
    assert!(matches!(
        ctx.resize(1024, 1024),
        Err(lux_render::RenderError::Allocation(_))
    ));
}

#[test]
fn test_device_budget_is_shared() {
    let device = ComputeDevice::new(&DeviceConfig {
        threads: 1,
        memory_budget_mb: 1,
    })
    .unwrap();
    assert_eq!(device.memory_budget(), 1024 * 1024);
    assert_eq!(device.memory_in_use(), 0);
}
