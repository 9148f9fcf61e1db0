//! Surface shared between the compute stage and presentation.
//!
//! One device buffer is handed back and forth: the render loop maps it with
//! `InteropSurface::acquire`, writes the tone-mapped frame and releases it;
//! the presenter reads it through a `PresentationHandle`. At most one side
//! holds the surface at a time and each side blocks while the other has it.

use std::fmt;
use std::sync::Arc;

use lux_math::{grid_extent, UVec2, Vec3};
use parking_lot::{Condvar, Mutex};

use crate::accumulation::AccumulationBuffer;
use crate::device::{ComputeDevice, DeviceBuffer, DispatchReport, LaunchConfig};
use crate::error::{AllocationError, InteropError};

/// Block extent of the surface copy kernel.
const COPY_BLOCK: UVec2 = UVec2::new(32, 32);

/// Display value of an accumulated sum: `pow(sum / n, 1 / gamma)`.
///
/// Negative sums clamp to zero; with no iterations the result is black.
#[inline]
pub fn tone_map(sum: Vec3, iterations: u32, gamma: f32) -> Vec3 {
    if iterations == 0 {
        return Vec3::ZERO;
    }
    let mean = sum.max(Vec3::ZERO) / iterations as f32;
    mean.powf(1.0 / gamma)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Idle,
    Compute,
    Presentation,
}

#[derive(Debug)]
struct SurfaceState {
    owner: Owner,
    lost: bool,
    extent: UVec2,
    buffer: DeviceBuffer,
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SurfaceState>,
    released: Condvar,
}

impl Shared {
    fn release(&self, bump_generation: bool) {
        let mut state = self.state.lock();
        state.owner = Owner::Idle;
        if bump_generation {
            state.generation += 1;
        }
        drop(state);
        self.released.notify_all();
    }
}

/// Compute side of the shared surface.
pub struct InteropSurface {
    shared: Arc<Shared>,
}

impl fmt::Debug for InteropSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("InteropSurface")
            .field("extent", &state.extent)
            .field("lost", &state.lost)
            .field("generation", &state.generation)
            .finish()
    }
}

impl InteropSurface {
    /// Allocate a surface for a `width` x `height` image.
    pub fn new(device: &ComputeDevice, width: u32, height: u32) -> Result<Self, AllocationError> {
        let buffer = device.alloc("interop surface", width as usize * height as usize * 3)?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SurfaceState {
                    owner: Owner::Idle,
                    lost: false,
                    extent: UVec2::new(width, height),
                    buffer,
                    generation: 0,
                }),
                released: Condvar::new(),
            }),
        })
    }

    /// Handle for the presentation side. Handles can be cloned freely.
    pub fn presentation(&self) -> PresentationHandle {
        PresentationHandle {
            shared: self.shared.clone(),
        }
    }

    /// Map the surface for writing, waiting while presentation holds it.
    pub fn acquire(&mut self) -> Result<MappedSurface<'_>, InteropError> {
        let mut state = self.shared.state.lock();
        while state.owner == Owner::Presentation && !state.lost {
            self.shared.released.wait(&mut state);
        }
        if state.lost {
            return Err(InteropError::SurfaceLost);
        }

        state.owner = Owner::Compute;
        Ok(MappedSurface {
            shared: &self.shared,
            buffer: state.buffer.clone(),
            extent: state.extent,
            written: false,
        })
    }

    /// Bring a lost surface back. Its contents are kept.
    pub fn restore(&mut self) {
        let mut state = self.shared.state.lock();
        if state.lost {
            log::info!("Interop surface restored");
        }
        state.lost = false;
    }

    /// Replace the buffer with a zeroed one at the new size.
    pub fn reallocate(
        &mut self,
        device: &ComputeDevice,
        width: u32,
        height: u32,
    ) -> Result<(), AllocationError> {
        let mut state = self.shared.state.lock();
        while state.owner != Owner::Idle {
            self.shared.released.wait(&mut state);
        }

        drop(std::mem::take(&mut state.buffer));
        state.extent = UVec2::ZERO;
        state.buffer = device.alloc("interop surface", width as usize * height as usize * 3)?;
        state.extent = UVec2::new(width, height);
        state.generation += 1;
        Ok(())
    }

    pub fn extent(&self) -> UVec2 {
        self.shared.state.lock().extent
    }

    pub fn is_lost(&self) -> bool {
        self.shared.state.lock().lost
    }

    /// Number of completed writes and reallocations.
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }
}

/// The surface mapped for the compute side. Released on drop.
pub struct MappedSurface<'a> {
    shared: &'a Shared,
    buffer: DeviceBuffer,
    extent: UVec2,
    written: bool,
}

impl MappedSurface<'_> {
    /// Device buffer backing the surface, three words per pixel.
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub fn capacity_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }

    /// Copy the tone-mapped accumulation into the surface and wait for it.
    pub fn write_frame(
        &mut self,
        device: &ComputeDevice,
        accumulation: &AccumulationBuffer,
        gamma: f32,
    ) -> Result<DispatchReport, InteropError> {
        let image = accumulation.extent();
        if image != self.extent {
            return Err(InteropError::ExtentMismatch {
                surface: (self.extent.x, self.extent.y),
                image: (image.x, image.y),
            });
        }

        let sums = accumulation.buffer().clone();
        let out = self.buffer.clone();
        let iterations = accumulation.iteration_count();
        let config = LaunchConfig::new(grid_extent(image, COPY_BLOCK), COPY_BLOCK);

        let report = device
            .launch("copy to surface", config, move |ctx| {
                for lane in ctx.lanes() {
                    let p = ctx.global(lane);
                    if p.x >= image.x || p.y >= image.y {
                        continue;
                    }
                    let i = (p.y * image.x + p.x) as usize;
                    out.store_vec3(i, tone_map(sums.load_vec3(i), iterations, gamma));
                }
            })
            .wait()?;

        self.written = true;
        Ok(report)
    }

    /// Hand the surface back to presentation.
    pub fn release(self) {}
}

impl Drop for MappedSurface<'_> {
    fn drop(&mut self) {
        self.shared.release(self.written);
    }
}

/// Presentation side of the shared surface.
#[derive(Clone)]
pub struct PresentationHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for PresentationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationHandle").finish_non_exhaustive()
    }
}

impl PresentationHandle {
    /// Take the surface for reading, waiting while compute holds it.
    pub fn acquire_read(&self) -> Result<PresentationGuard, InteropError> {
        let mut state = self.shared.state.lock();
        while state.owner != Owner::Idle && !state.lost {
            self.shared.released.wait(&mut state);
        }
        if state.lost {
            return Err(InteropError::SurfaceLost);
        }

        state.owner = Owner::Presentation;
        Ok(PresentationGuard {
            shared: self.shared.clone(),
            buffer: state.buffer.clone(),
            extent: state.extent,
            generation: state.generation,
        })
    }

    /// Mark the surface lost, as when the presentation context goes away.
    ///
    /// Waiters wake up and fail; acquires fail until the surface is restored.
    pub fn mark_lost(&self) {
        self.shared.state.lock().lost = true;
        self.shared.released.notify_all();
        log::warn!("Interop surface lost");
    }

    /// Generation of the last completed write, without taking the surface.
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }
}

/// Read access to the surface. Released on drop.
pub struct PresentationGuard {
    shared: Arc<Shared>,
    buffer: DeviceBuffer,
    extent: UVec2,
    generation: u64,
}

impl PresentationGuard {
    pub fn extent(&self) -> UVec2 {
        self.extent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Display values, row-major, top row first.
    pub fn pixels(&self) -> Vec<Vec3> {
        self.buffer
            .to_vec()
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect()
    }

    /// Pack into 8-bit RGBA, clamping to [0, 1].
    pub fn write_rgba8(&self, out: &mut [u8]) {
        let pixels = self.buffer.len() / 3;
        for (i, texel) in out.chunks_exact_mut(4).take(pixels).enumerate() {
            texel.copy_from_slice(&color_to_rgba(self.buffer.load_vec3(i)));
        }
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = vec![0; self.buffer.len() / 3 * 4];
        self.write_rgba8(&mut out);
        out
    }
}

impl Drop for PresentationGuard {
    fn drop(&mut self) {
        self.shared.release(false);
    }
}

/// Convert a display color to 8-bit RGBA.
pub fn color_to_rgba(color: Vec3) -> [u8; 4] {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    [c.x as u8, c.y as u8, c.z as u8, 255]
}
