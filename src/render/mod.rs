// src/render/mod.rs
//! Render parameter publishing
//!
//! The simulation hands the rendering collaborator a write-only parameter
//! set each successful tick: the density field handle, grid dimensions,
//! world-space bounds, and ray-march parameters. Nothing flows back.

use cgmath::Vector3;

use crate::field::FieldHandle;
use crate::grid::GridDims;

/// Static world-space bounds of the simulated volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBounds {
    pub min: Vector3<f32>,
    pub size: Vector3<f32>,
}

impl VolumeBounds {
    /// Bounds from a host transform: the volume is centered on `position`
    /// and spans `scale` world units.
    pub fn from_transform(position: Vector3<f32>, scale: Vector3<f32>) -> Self {
        Self {
            min: position - scale * 0.5,
            size: scale,
        }
    }

    /// Default bounds: the grid centered on the origin at `cell_size`
    /// world units per cell.
    pub fn centered(dims: GridDims, cell_size: f32) -> Self {
        let size = Vector3::new(
            dims.nx as f32 * cell_size,
            dims.ny as f32 * cell_size,
            dims.nz as f32 * cell_size,
        );
        Self {
            min: -size * 0.5,
            size,
        }
    }
}

/// Ray-march parameters forwarded untouched to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Primary (lit) cloud color.
    pub cloud_color: Vector3<f32>,
    /// Shadowed cloud color.
    pub dark_color: Vector3<f32>,
    /// Absorption / extinction coefficient.
    pub absorption: f32,
    /// Ray-march step count.
    pub steps: u32,
    /// Draw the debug bounding box.
    pub show_bounds: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            cloud_color: Vector3::new(1.0, 1.0, 1.0),
            dark_color: Vector3::new(0.3, 0.35, 0.42),
            absorption: 1.0,
            steps: 64,
            show_bounds: false,
        }
    }
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame {
    pub density: FieldHandle,
    pub dims: GridDims,
    pub bounds: VolumeBounds,
    pub params: RenderParams,
    /// Tick counter at publish time; skipped ticks never publish.
    pub frame: u64,
}

/// Sink for published frames. Implemented by the rendering collaborator;
/// the simulation only ever writes into it.
pub trait RenderSink {
    fn publish(&mut self, frame: &RenderFrame);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_transform() {
        let bounds = VolumeBounds::from_transform(
            Vector3::new(10.0, 0.0, -4.0),
            Vector3::new(4.0, 2.0, 8.0),
        );
        assert_eq!(bounds.min, Vector3::new(8.0, -1.0, -8.0));
        assert_eq!(bounds.size, Vector3::new(4.0, 2.0, 8.0));
    }

    #[test]
    fn test_centered_bounds_span_the_grid() {
        let bounds = VolumeBounds::centered(GridDims::new(16, 8, 4), 0.5);
        assert_eq!(bounds.size, Vector3::new(8.0, 4.0, 2.0));
        assert_eq!(bounds.min, Vector3::new(-4.0, -2.0, -1.0));
    }
}
