// src/field/mod.rs
//! Field handles and double-buffering
//!
//! Fields are referenced through opaque handles owned by an executor; the
//! simulation core never touches raw storage. Ping-pong stages exchange the
//! "current" and "scratch" roles of a buffer pair by swapping handles, never
//! by copying contents.

use crate::grid::GridDims;

/// Storage shape of a field, fixed per field identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One f32 per cell (density, pressure, divergence, source density).
    Scalar,
    /// Three f32 components per cell plus one padding float (velocity).
    Vector,
}

impl FieldKind {
    /// Floats stored per cell.
    pub fn channels(&self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vector => 4,
        }
    }

    /// Total float count for a field of this kind over `dims`.
    pub fn len(&self, dims: GridDims) -> usize {
        dims.cell_count() * self.channels()
    }
}

/// Opaque handle to an executor-owned field.
///
/// Ids are unique per allocation, so handle equality doubles as field
/// reference identity (a rebuilt field always gets a fresh handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FieldHandle(pub(crate) u64);

impl FieldHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Two-slot buffer pair for ping-pong stages.
///
/// `swap` exchanges which slot is "current" vs "scratch"; a write pass
/// therefore never reads and writes the same buffer across cells.
#[derive(Debug, Clone, Copy)]
pub struct DoubleBuffered {
    current: FieldHandle,
    scratch: FieldHandle,
}

impl DoubleBuffered {
    pub fn new(current: FieldHandle, scratch: FieldHandle) -> Self {
        Self { current, scratch }
    }

    /// The buffer holding the latest completed iterate.
    pub fn current(&self) -> FieldHandle {
        self.current
    }

    /// The write target for the next pass.
    pub fn scratch(&self) -> FieldHandle {
        self.scratch
    }

    /// Exchanges the current and scratch roles. Handle swap only, contents
    /// are never copied.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.scratch);
    }
}

/// The fixed working set of a simulation instance.
///
/// Allocated once at startup, released at teardown. The source-density
/// field is owned by the synthesizer because its lifetime differs (rebuilt
/// on parameter change).
#[derive(Debug, Clone, Copy)]
pub struct FieldSet {
    pub density: DoubleBuffered,
    pub pressure: DoubleBuffered,
    pub divergence: FieldHandle,
    pub velocity: FieldHandle,
}

impl FieldSet {
    /// Every handle in the set, for teardown.
    pub fn handles(&self) -> [FieldHandle; 6] {
        [
            self.density.current(),
            self.density.scratch(),
            self.pressure.current(),
            self.pressure.scratch(),
            self.divergence,
            self.velocity,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exchanges_roles() {
        let a = FieldHandle(1);
        let b = FieldHandle(2);
        let mut pair = DoubleBuffered::new(a, b);
        assert_eq!(pair.current(), a);
        assert_eq!(pair.scratch(), b);
        pair.swap();
        assert_eq!(pair.current(), b);
        assert_eq!(pair.scratch(), a);
        pair.swap();
        assert_eq!(pair.current(), a);
    }

    #[test]
    fn test_field_kind_layout() {
        let dims = GridDims::new(4, 4, 4);
        assert_eq!(FieldKind::Scalar.len(dims), 64);
        assert_eq!(FieldKind::Vector.len(dims), 256);
    }
}
