//! Progressive accumulation buffer.
//!
//! Holds the running per-pixel radiance sum on the device and the number of
//! frames summed so far. The displayed image is `sum / iteration_count`.

use std::sync::Arc;

use lux_math::{UVec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera::Camera;
use crate::device::{ComputeDevice, DeviceBuffer, DispatchReport};
use crate::dispatch::{self, DispatchDescriptor, Tile, TileKernel};
use crate::error::{AllocationError, DispatchError};
use crate::kernel::KernelBinding;

/// Per-pixel radiance sums plus the iteration counter.
#[derive(Debug)]
pub struct AccumulationBuffer {
    radiance: DeviceBuffer,
    extent: UVec2,
    iteration_count: u32,
}

impl AccumulationBuffer {
    /// Allocate a zeroed buffer for a `width` x `height` image.
    pub fn allocate(
        device: &ComputeDevice,
        width: u32,
        height: u32,
    ) -> Result<Self, AllocationError> {
        let mut buffer = Self {
            radiance: DeviceBuffer::default(),
            extent: UVec2::ZERO,
            iteration_count: 0,
        };
        buffer.reallocate(device, width, height)?;
        Ok(buffer)
    }

    /// Release the current buffer and allocate a zeroed one at the new size.
    ///
    /// The old memory is returned to the device before the new allocation,
    /// so a resize never needs room for both.
    pub fn reallocate(
        &mut self,
        device: &ComputeDevice,
        width: u32,
        height: u32,
    ) -> Result<(), AllocationError> {
        drop(std::mem::take(&mut self.radiance));
        self.extent = UVec2::ZERO;
        self.iteration_count = 0;

        let slots = width as usize * height as usize;
        self.radiance = device.alloc("accumulation", slots * 3)?;
        self.extent = UVec2::new(width, height);
        log::debug!("Accumulation buffer allocated for {}x{}", width, height);
        Ok(())
    }

    /// Zero every slot and restart the iteration count.
    pub fn reset(&mut self, device: &ComputeDevice) {
        device.fill(&self.radiance, 0.0);
        self.iteration_count = 0;
    }

    /// Add one frame of samples to every pixel.
    ///
    /// Waits for the dispatch to finish. The iteration count is bumped even
    /// when the dispatch faults; whatever tiles completed stay in the sum.
    /// A descriptor built for another image size is rejected before launch
    /// and leaves the count unchanged.
    pub fn accumulate(
        &mut self,
        device: &ComputeDevice,
        descriptor: &DispatchDescriptor,
        camera: &Camera,
        binding: &KernelBinding,
    ) -> Result<DispatchReport, DispatchError> {
        if descriptor.image != self.extent {
            return Err(DispatchError::ExtentMismatch {
                buffer: (self.extent.x, self.extent.y),
                dispatch: (descriptor.image.x, descriptor.image.y),
            });
        }

        let kernel = Arc::new(AccumulateTiles {
            binding: binding.clone(),
            camera: *camera,
            radiance: self.radiance.clone(),
            image: self.extent,
            seed: self.iteration_count.wrapping_add(rand::random::<u32>()),
        });

        let result = dispatch::launch(device, descriptor, kernel).wait();
        self.iteration_count += 1;
        result
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn extent(&self) -> UVec2 {
        self.extent
    }

    /// Number of radiance slots (pixels).
    pub fn slot_count(&self) -> usize {
        self.radiance.len() / 3
    }

    /// Device buffer holding the sums, three words per pixel.
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.radiance
    }

    /// Mean radiance of a pixel, or `None` outside the image.
    pub fn average(&self, x: u32, y: u32) -> Option<Vec3> {
        if x >= self.extent.x || y >= self.extent.y {
            return None;
        }
        let sum = self.radiance.load_vec3((y * self.extent.x + x) as usize);
        Some(if self.iteration_count == 0 {
            Vec3::ZERO
        } else {
            sum / self.iteration_count as f32
        })
    }

    /// Host copy of every radiance sum, row-major.
    pub fn snapshot(&self) -> Vec<Vec3> {
        self.radiance
            .to_vec()
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect()
    }
}

/// Tile kernel adding one sample per pixel into the sums.
struct AccumulateTiles {
    binding: KernelBinding,
    camera: Camera,
    radiance: DeviceBuffer,
    image: UVec2,
    seed: u32,
}

impl TileKernel for AccumulateTiles {
    fn label(&self) -> &'static str {
        "accumulate"
    }

    fn process_tile(&self, tile: &Tile) {
        let mut rng = StdRng::seed_from_u64(((self.seed as u64) << 32) | tile.index as u64);
        for pixel in tile.pixels() {
            let color = self
                .binding
                .shade_pixel(&self.camera, pixel, self.image, &mut rng);
            self.radiance
                .add_vec3((pixel.y * self.image.x + pixel.x) as usize, color);
        }
    }
}
