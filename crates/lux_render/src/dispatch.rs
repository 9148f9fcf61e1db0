//! Workload partitioning.
//!
//! The image is cut into tiles of one block each. Three strategies map
//! launched blocks onto those tiles:
//!
//! - `FlatGrid`: one block per tile, block (i, j) renders tile (i, j).
//! - `GroupedTiling`: the grid is `group` times smaller; each block walks
//!   one tile per group cell, at the same offset within every group.
//! - `PersistentClaiming`: a small fixed grid of blocks loops, claiming
//!   tile indices from a shared counter until the counter passes the end.
//!
//! Every strategy processes each tile exactly once per dispatch.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use lux_math::{grid_extent, UVec2};
use serde::{Deserialize, Serialize};

use crate::config::TilingConfig;
use crate::device::{BlockContext, ComputeDevice, DispatchHandle, DispatchReport, LaunchConfig};
use crate::error::DispatchError;

/// Which partitioning strategy a dispatch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    FlatGrid,
    GroupedTiling,
    PersistentClaiming,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::FlatGrid,
        StrategyKind::GroupedTiling,
        StrategyKind::PersistentClaiming,
    ];

    /// Strategy for a zero-based selector, as used by keyboard shortcuts.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::FlatGrid => "flat grid",
            StrategyKind::GroupedTiling => "grouped tiling",
            StrategyKind::PersistentClaiming => "persistent claiming",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rectangle of pixels handled by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Tile position in the tile grid
    pub coord: UVec2,
    /// Row-major index in the tile grid
    pub index: u32,
    /// Top-left pixel
    pub origin: UVec2,
    /// Pixels covered; smaller than the block at the right and bottom edges
    pub extent: UVec2,
}

impl Tile {
    fn new(coord: UVec2, block_count: UVec2, block: UVec2, image: UVec2) -> Self {
        let origin = coord * block;
        Self {
            coord,
            index: coord.y * block_count.x + coord.x,
            origin,
            extent: (origin + block).min(image) - origin,
        }
    }

    /// Pixel coordinates inside this tile, row-major.
    pub fn pixels(&self) -> impl Iterator<Item = UVec2> {
        let Tile { origin, extent, .. } = *self;
        (0..extent.y).flat_map(move |y| (0..extent.x).map(move |x| origin + UVec2::new(x, y)))
    }
}

/// Work run once per tile.
pub trait TileKernel: Send + Sync + 'static {
    /// Kernel name for logs and errors.
    fn label(&self) -> &'static str {
        "tile kernel"
    }

    fn process_tile(&self, tile: &Tile);
}

/// Launch geometry for one strategy over one image.
#[derive(Debug, Clone)]
pub struct DispatchDescriptor {
    pub kind: StrategyKind,
    /// Image extent in pixels
    pub image: UVec2,
    /// Pixels per tile, lanes per block
    pub block: UVec2,
    /// Tile grid extent: `ceil(image / block)`
    pub block_count: UVec2,
    /// Launch grid extent in blocks
    pub grid: UVec2,
    /// Blocks per group (grouped tiling)
    pub group: UVec2,
    /// Tiles each grouped block walks in x and y
    pub group_count: UVec2,
    claim_counter: Arc<AtomicU32>,
}

impl DispatchDescriptor {
    /// Compute launch geometry for `kind` over an image.
    pub fn for_image(kind: StrategyKind, image: UVec2, tiling: &TilingConfig) -> Self {
        let block = tiling.block();
        let block_count = grid_extent(image, block);
        let group = tiling.group();

        let (grid, group_count) = match kind {
            StrategyKind::FlatGrid => (block_count, UVec2::ONE),
            StrategyKind::GroupedTiling => {
                let group_count = grid_extent(image, block * group);
                (group, group_count)
            }
            StrategyKind::PersistentClaiming => (tiling.persistent_grid(), UVec2::ONE),
        };

        log::debug!(
            "{} dispatch over {}x{}: {} tiles, grid {}x{}",
            kind,
            image.x,
            image.y,
            block_count.x * block_count.y,
            grid.x,
            grid.y
        );

        Self {
            kind,
            image,
            block,
            block_count,
            grid,
            group,
            group_count,
            claim_counter: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of tiles in the image.
    pub fn total_tiles(&self) -> u32 {
        self.block_count.x * self.block_count.y
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::new(self.grid, self.block)
    }

    /// Rewind the persistent claim counter to the first tile.
    pub fn reset_claims(&self) {
        self.claim_counter.store(0, Ordering::Release);
    }

    fn tile(&self, coord: UVec2) -> Tile {
        Tile::new(coord, self.block_count, self.block, self.image)
    }
}

/// An in-flight tiled dispatch.
#[must_use = "dropping a dispatch discards its error status"]
#[derive(Debug)]
pub struct TileDispatch {
    handle: DispatchHandle,
    tiles: Arc<AtomicU32>,
}

impl TileDispatch {
    /// Wait for completion; the report carries the number of tiles processed.
    pub fn wait(self) -> Result<DispatchReport, DispatchError> {
        let mut report = self.handle.wait()?;
        report.tiles = self.tiles.load(Ordering::Acquire);
        Ok(report)
    }
}

/// Launch `kernel` over every tile of the image using the descriptor's strategy.
pub fn launch(
    device: &ComputeDevice,
    descriptor: &DispatchDescriptor,
    kernel: Arc<dyn TileKernel>,
) -> TileDispatch {
    let tiles = Arc::new(AtomicU32::new(0));
    let label = kernel.label();
    let config = descriptor.launch_config();

    let handle = match descriptor.kind {
        StrategyKind::FlatGrid => {
            let desc = descriptor.clone();
            let done = tiles.clone();
            device.launch(label, config, move |ctx| {
                run_flat(&desc, kernel.as_ref(), &done, ctx)
            })
        }
        StrategyKind::GroupedTiling => {
            let desc = descriptor.clone();
            let done = tiles.clone();
            device.launch(label, config, move |ctx| {
                run_grouped(&desc, kernel.as_ref(), &done, ctx)
            })
        }
        StrategyKind::PersistentClaiming => {
            // The counter must be zero before the first block claims
            descriptor.reset_claims();
            let desc = descriptor.clone();
            let done = tiles.clone();
            device.launch(label, config, move |_| {
                run_persistent(&desc, kernel.as_ref(), &done)
            })
        }
    };

    TileDispatch { handle, tiles }
}

fn run_flat(
    desc: &DispatchDescriptor,
    kernel: &dyn TileKernel,
    done: &AtomicU32,
    ctx: BlockContext,
) {
    kernel.process_tile(&desc.tile(ctx.index));
    done.fetch_add(1, Ordering::Relaxed);
}

fn run_grouped(
    desc: &DispatchDescriptor,
    kernel: &dyn TileKernel,
    done: &AtomicU32,
    ctx: BlockContext,
) {
    for cy in 0..desc.group_count.y {
        for cx in 0..desc.group_count.x {
            let coord = UVec2::new(cx, cy) * desc.group + ctx.index;
            if coord.x < desc.block_count.x && coord.y < desc.block_count.y {
                kernel.process_tile(&desc.tile(coord));
                done.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn run_persistent(desc: &DispatchDescriptor, kernel: &dyn TileKernel, done: &AtomicU32) {
    let total = desc.total_tiles();
    loop {
        let claim = desc.claim_counter.fetch_add(1, Ordering::AcqRel);
        if claim >= total {
            break;
        }
        let coord = UVec2::new(claim % desc.block_count.x, claim / desc.block_count.x);
        kernel.process_tile(&desc.tile(coord));
        done.fetch_add(1, Ordering::Relaxed);
    }
}
