// benches/strategies.rs -- Compare the three dispatch strategies.
//
//   cargo bench -p lux_render
//
// Each iteration accumulates one frame of the demo scene at 320x240.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use lux_math::{OrbitTransform, UVec2};
use lux_render::{
    AccumulationBuffer, CameraRig, ComputeDevice, DeviceConfig, DispatchDescriptor, KernelBinding,
    PathTracer, SamplingConfig, StrategyKind, TilingConfig,
};

fn bench_strategies(c: &mut Criterion) {
    let scene = lux_core::demo::three_spheres().expect("demo scene");
    let extent = UVec2::new(320, 240);
    let device = ComputeDevice::new(&DeviceConfig::default()).expect("device");
    let camera = CameraRig::new(scene.camera, extent).frame(&OrbitTransform::IDENTITY);
    let sampling = SamplingConfig {
        max_depth: 4,
        ..Default::default()
    };
    let binding = KernelBinding::new(Arc::new(scene), Arc::new(PathTracer), sampling);
    let mut accumulation =
        AccumulationBuffer::allocate(&device, extent.x, extent.y).expect("buffer");

    let mut group = c.benchmark_group("accumulate");
    group.sample_size(20);
    for kind in StrategyKind::ALL {
        let descriptor = DispatchDescriptor::for_image(kind, extent, &TilingConfig::default());
        group.bench_function(BenchmarkId::new(kind.name(), "320x240"), |b| {
            b.iter(|| {
                accumulation
                    .accumulate(&device, &descriptor, &camera, &binding)
                    .expect("dispatch")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);
