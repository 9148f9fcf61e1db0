// Re-export glam for convenience
pub use glam::*;

// Lux math types
mod extent;
mod interval;
mod orbit;
mod ray;

pub use extent::{ceil_div, grid_extent};
pub use interval::Interval;
pub use orbit::OrbitTransform;
pub use ray::Ray;
