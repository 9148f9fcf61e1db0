//! Integer helpers for mapping images onto compute grids.

use glam::UVec2;

/// Integer division rounding towards positive infinity.
///
/// `divisor` must be non-zero.
#[inline]
pub fn ceil_div(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor)
}

/// Number of `cell`-sized cells needed to cover `extent` in each axis.
///
/// A 640x480 image with 32x32 cells needs a 20x15 grid.
#[inline]
pub fn grid_extent(extent: UVec2, cell: UVec2) -> UVec2 {
    UVec2::new(ceil_div(extent.x, cell.x), ceil_div(extent.y, cell.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 32), 0);
        assert_eq!(ceil_div(1, 32), 1);
        assert_eq!(ceil_div(32, 32), 1);
        assert_eq!(ceil_div(33, 32), 2);
    }

    #[test]
    fn test_grid_extent_exact_fit() {
        let grid = grid_extent(UVec2::new(640, 480), UVec2::splat(32));
        assert_eq!(grid, UVec2::new(20, 15));
    }

    #[test]
    fn test_grid_extent_partial_fit() {
        // 100 / 32 leaves a partial edge cell in both axes
        let grid = grid_extent(UVec2::new(100, 70), UVec2::splat(32));
        assert_eq!(grid, UVec2::new(4, 3));
    }
}
