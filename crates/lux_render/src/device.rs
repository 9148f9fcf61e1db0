//! Compute device: a grid executor with scoped device memory.
//!
//! The device mirrors the GPU execution model the render core is written
//! against. A launch covers a 2D grid of blocks; each block runs as one unit
//! of work on a rayon pool and walks its own lanes. Launches return
//! immediately with a `DispatchHandle`; `DispatchHandle::wait` is the
//! synchronize point and reports whether any block faulted.
//!
//! Device memory is handed out as `DeviceBuffer`s of f32 words drawn from a
//! fixed budget. Words are stored as atomics so that many blocks can write
//! disjoint slots of the same buffer without locking; the budget is returned
//! when the last handle to a buffer is dropped.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lux_math::{UVec2, Vec3};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::config::DeviceConfig;
use crate::error::{AllocationError, DispatchError, RenderError};

/// Fixed pool of device memory shared by every buffer of a device.
#[derive(Debug)]
struct MemoryBudget {
    capacity: usize,
    used: AtomicUsize,
}

impl MemoryBudget {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    fn reserve(&self, label: &'static str, bytes: usize) -> Result<(), AllocationError> {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let available = self.capacity.saturating_sub(used);
            if bytes > available {
                return Err(AllocationError::OutOfMemory {
                    label,
                    requested: bytes,
                    available,
                });
            }
            match self.used.compare_exchange_weak(
                used,
                used + bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => used = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Backing store of a buffer. Returns its bytes to the budget on drop.
struct Allocation {
    label: &'static str,
    words: Box<[AtomicU32]>,
    lease: Option<(Arc<MemoryBudget>, usize)>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some((budget, bytes)) = self.lease.take() {
            budget.release(bytes);
            log::trace!("Released {} bytes of '{}'", bytes, self.label);
        }
    }
}

/// Handle to a block of device memory holding f32 words.
///
/// Cloning the handle shares the allocation; it is freed when the last
/// handle goes away. A default buffer is empty and owns no memory.
#[derive(Clone)]
pub struct DeviceBuffer {
    alloc: Arc<Allocation>,
}

impl Default for DeviceBuffer {
    fn default() -> Self {
        Self {
            alloc: Arc::new(Allocation {
                label: "empty",
                words: Vec::new().into_boxed_slice(),
                lease: None,
            }),
        }
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("label", &self.alloc.label)
            .field("len", &self.len())
            .finish()
    }
}

impl DeviceBuffer {
    /// Number of f32 words.
    pub fn len(&self) -> usize {
        self.alloc.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alloc.words.is_empty()
    }

    /// Capacity in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }

    pub fn label(&self) -> &'static str {
        self.alloc.label
    }

    /// True if both handles refer to the same allocation.
    pub fn same_allocation(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.alloc, &other.alloc)
    }

    #[inline]
    pub fn load(&self, index: usize) -> f32 {
        f32::from_bits(self.alloc.words[index].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, index: usize, value: f32) {
        self.alloc.words[index].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Read the RGB triple stored for `pixel`.
    #[inline]
    pub fn load_vec3(&self, pixel: usize) -> Vec3 {
        let base = pixel * 3;
        Vec3::new(self.load(base), self.load(base + 1), self.load(base + 2))
    }

    /// Write the RGB triple stored for `pixel`.
    #[inline]
    pub fn store_vec3(&self, pixel: usize, value: Vec3) {
        let base = pixel * 3;
        self.store(base, value.x);
        self.store(base + 1, value.y);
        self.store(base + 2, value.z);
    }

    /// Add to the RGB triple stored for `pixel`.
    ///
    /// Not atomic as a read-modify-write: each pixel must have a single
    /// writer per dispatch.
    #[inline]
    pub fn add_vec3(&self, pixel: usize, value: Vec3) {
        self.store_vec3(pixel, self.load_vec3(pixel) + value);
    }

    /// Copy the contents back to host memory.
    pub fn to_vec(&self) -> Vec<f32> {
        self.alloc
            .words
            .iter()
            .map(|word| f32::from_bits(word.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Grid and block extents of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Blocks in the grid
    pub grid: UVec2,
    /// Lanes per block
    pub block: UVec2,
}

impl LaunchConfig {
    pub fn new(grid: UVec2, block: UVec2) -> Self {
        Self { grid, block }
    }

    /// Total number of blocks launched.
    pub fn block_count(&self) -> u32 {
        self.grid.x * self.grid.y
    }
}

/// What a block knows about itself while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Position of this block in the grid
    pub index: UVec2,
    /// Grid extent in blocks
    pub grid: UVec2,
    /// Block extent in lanes
    pub block: UVec2,
}

impl BlockContext {
    /// Lane coordinates of this block in row-major order.
    pub fn lanes(&self) -> impl Iterator<Item = UVec2> {
        let block = self.block;
        (0..block.y).flat_map(move |y| (0..block.x).map(move |x| UVec2::new(x, y)))
    }

    /// Global coordinate of `lane` when block (i, j) covers tile (i, j).
    pub fn global(&self, lane: UVec2) -> UVec2 {
        self.index * self.block + lane
    }
}

/// Outcome of a completed launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub label: &'static str,
    /// Blocks launched
    pub blocks: u32,
    /// Tiles processed, when the launch was a tiled dispatch
    pub tiles: u32,
    /// Wall time from the first block starting to the last one finishing
    pub elapsed: Duration,
}

/// Completion handle of an in-flight launch.
#[must_use = "dropping a dispatch handle discards its error status"]
#[derive(Debug)]
pub struct DispatchHandle {
    label: &'static str,
    rx: Receiver<Result<DispatchReport, DispatchError>>,
}

impl DispatchHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Block until every block of the launch has finished.
    ///
    /// This is the post-dispatch error query: a fault in any block is
    /// reported here.
    pub fn wait(self) -> Result<DispatchReport, DispatchError> {
        self.rx
            .recv()
            .map_err(|_| DispatchError::Lost { label: self.label })?
    }
}

/// CPU compute device backed by a rayon thread pool.
pub struct ComputeDevice {
    pool: rayon::ThreadPool,
    budget: Arc<MemoryBudget>,
}

impl fmt::Debug for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeDevice")
            .field("threads", &self.threads())
            .field("memory_in_use", &self.memory_in_use())
            .field("memory_budget", &self.memory_budget())
            .finish()
    }
}

impl ComputeDevice {
    /// Start a device with its own worker threads.
    pub fn new(config: &DeviceConfig) -> Result<Self, RenderError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("lux-compute-{i}"));
        if config.threads > 0 {
            builder = builder.num_threads(config.threads);
        }
        let pool = builder
            .build()
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let device = Self {
            pool,
            budget: Arc::new(MemoryBudget::new(config.memory_budget_bytes())),
        };
        log::info!("Compute device ready: {}", device.describe());
        Ok(device)
    }

    /// One-line description for logs.
    pub fn describe(&self) -> String {
        format!(
            "CPU grid executor, {} threads, {:.1} MiB budget",
            self.threads(),
            self.memory_budget() as f64 / (1024.0 * 1024.0)
        )
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Bytes currently held by live buffers.
    pub fn memory_in_use(&self) -> usize {
        self.budget.used.load(Ordering::Acquire)
    }

    pub fn memory_budget(&self) -> usize {
        self.budget.capacity
    }

    /// Run `op` on the device's worker threads.
    pub(crate) fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Set every word of `buffer` to `value`. Blocks until done.
    pub fn fill(&self, buffer: &DeviceBuffer, value: f32) {
        let bits = value.to_bits();
        self.install(|| {
            buffer
                .alloc
                .words
                .par_iter()
                .for_each(|word| word.store(bits, Ordering::Relaxed));
        });
    }

    /// Allocate a zeroed buffer of `len` f32 words.
    pub fn alloc(&self, label: &'static str, len: usize) -> Result<DeviceBuffer, AllocationError> {
        let bytes = len.saturating_mul(std::mem::size_of::<f32>());
        self.budget.reserve(label, bytes)?;

        let words: Vec<AtomicU32> = (0..len).map(|_| AtomicU32::new(0)).collect();
        log::debug!("Allocated {} bytes for '{}'", bytes, label);

        Ok(DeviceBuffer {
            alloc: Arc::new(Allocation {
                label,
                words: words.into_boxed_slice(),
                lease: Some((self.budget.clone(), bytes)),
            }),
        })
    }

    /// Launch `block_fn` once per block of the grid and return immediately.
    ///
    /// A panicking block does not stop the others; the first panic message
    /// is reported through the handle.
    pub fn launch<F>(
        &self,
        label: &'static str,
        config: LaunchConfig,
        block_fn: F,
    ) -> DispatchHandle
    where
        F: Fn(BlockContext) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let blocks = config.block_count();

        self.pool.spawn(move || {
            let started = Instant::now();
            let fault: Mutex<Option<String>> = Mutex::new(None);

            (0..blocks).into_par_iter().for_each(|i| {
                let ctx = BlockContext {
                    index: UVec2::new(i % config.grid.x, i / config.grid.x),
                    grid: config.grid,
                    block: config.block,
                };
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| block_fn(ctx))) {
                    let mut slot = fault.lock();
                    if slot.is_none() {
                        *slot = Some(panic_message(payload.as_ref()));
                    }
                }
            });

            let result = match fault.into_inner() {
                None => Ok(DispatchReport {
                    label,
                    blocks,
                    tiles: 0,
                    elapsed: started.elapsed(),
                }),
                Some(message) => Err(DispatchError::KernelFault { label, message }),
            };
            // The receiver may have been dropped by a caller that does not care
            let _ = tx.send(result);
        });

        DispatchHandle { label, rx }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
