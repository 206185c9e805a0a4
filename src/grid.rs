// src/grid.rs
//! Grid dimensions and tile math
//!
//! Every field in a simulation instance shares one implicit 3D lattice.
//! Compute kernels run over the lattice in 8x8x8 tiles, so workgroup counts
//! are always the ceiling division of each axis by the tile size.

use crate::error::SimError;

/// Per-axis tile size of every compute kernel (`@workgroup_size(8, 8, 8)`).
pub const TILE_SIZE: u32 = 8;

/// Dimensions of the simulation lattice in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridDims {
    pub fn new(nx: u32, ny: u32, nz: u32) -> Self {
        Self { nx, ny, nz }
    }

    /// Validates that every axis is strictly positive.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(SimError::InvalidDims(self.nx, self.ny, self.nz));
        }
        Ok(())
    }

    /// Total cell count of the lattice.
    pub fn cell_count(&self) -> usize {
        self.nx as usize * self.ny as usize * self.nz as usize
    }

    /// Linear index of cell `(i, j, k)`, x-major.
    #[inline]
    pub fn index(&self, i: u32, j: u32, k: u32) -> usize {
        (i + self.nx * (j + self.ny * k)) as usize
    }

    /// Whether `(i, j, k)` lies inside the lattice.
    #[inline]
    pub fn contains(&self, i: u32, j: u32, k: u32) -> bool {
        i < self.nx && j < self.ny && k < self.nz
    }

    /// Workgroup count per axis: `ceil(dim / TILE_SIZE)`.
    ///
    /// Guarantees full grid coverage when dimensions are not multiples of
    /// the tile size; out-of-range invocations are bounds-guarded inside
    /// each kernel.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (
            self.nx.div_ceil(TILE_SIZE),
            self.ny.div_ceil(TILE_SIZE),
            self.nz.div_ceil(TILE_SIZE),
        )
    }

    /// Smallest axis extent, used to clamp injection radii to the volume.
    pub fn min_extent(&self) -> u32 {
        self.nx.min(self.ny).min(self.nz)
    }
}

impl From<(u32, u32, u32)> for GridDims {
    fn from((nx, ny, nz): (u32, u32, u32)) -> Self {
        Self::new(nx, ny, nz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroups_ceiling_division() {
        assert_eq!(GridDims::new(8, 8, 8).workgroups(), (1, 1, 1));
        assert_eq!(GridDims::new(16, 8, 24).workgroups(), (2, 1, 3));
        // Non-multiples round up on each axis independently.
        assert_eq!(GridDims::new(9, 7, 17).workgroups(), (2, 1, 3));
        assert_eq!(GridDims::new(1, 1, 1).workgroups(), (1, 1, 1));
    }

    #[test]
    fn test_workgroups_cover_every_cell() {
        let dims = GridDims::new(9, 7, 17);
        let (wx, wy, wz) = dims.workgroups();
        assert!(wx * TILE_SIZE >= dims.nx);
        assert!(wy * TILE_SIZE >= dims.ny);
        assert!(wz * TILE_SIZE >= dims.nz);

        // Walking tiles-then-lanes with the bounds guard visits every cell
        // exactly once.
        let mut visits = vec![0u32; dims.cell_count()];
        for gz in 0..wz {
            for gy in 0..wy {
                for gx in 0..wx {
                    for lz in 0..TILE_SIZE {
                        for ly in 0..TILE_SIZE {
                            for lx in 0..TILE_SIZE {
                                let (i, j, k) = (
                                    gx * TILE_SIZE + lx,
                                    gy * TILE_SIZE + ly,
                                    gz * TILE_SIZE + lz,
                                );
                                if dims.contains(i, j, k) {
                                    visits[dims.index(i, j, k)] += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
        assert!(visits.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_validate_rejects_zero_axes() {
        assert!(GridDims::new(0, 8, 8).validate().is_err());
        assert!(GridDims::new(8, 0, 8).validate().is_err());
        assert!(GridDims::new(8, 8, 0).validate().is_err());
        assert!(GridDims::new(8, 8, 8).validate().is_ok());
    }

    #[test]
    fn test_index_is_x_major() {
        let dims = GridDims::new(4, 3, 2);
        assert_eq!(dims.index(0, 0, 0), 0);
        assert_eq!(dims.index(1, 0, 0), 1);
        assert_eq!(dims.index(0, 1, 0), 4);
        assert_eq!(dims.index(0, 0, 1), 12);
        assert_eq!(dims.index(3, 2, 1), dims.cell_count() - 1);
    }
}
