//! # Cumulus Prelude
//!
//! Convenient re-export set for typical hosts:
//!
//! ```rust
//! use cumulus::prelude::*;
//!
//! fn main() -> Result<(), SimError> {
//!     let mut sim = CloudSimulation::new(
//!         CpuKernels::new(),
//!         GridDims::new(32, 32, 32),
//!         SimulationParams::default(),
//!     )?;
//!     sim.step(1.0 / 60.0)?;
//!     sim.shutdown()?;
//!     Ok(())
//! }
//! ```

// Core driver types
pub use crate::error::SimError;
pub use crate::sim::{
    CloudSimulation, SimulationParams, SourceLayout, SourceParams, SourceSynthesizer,
};

// Grid and field types
pub use crate::field::{DoubleBuffered, FieldHandle, FieldKind};
pub use crate::grid::GridDims;

// Execution backends
pub use crate::kernel::{Bindings, CpuKernels, GpuKernels, Kernel, KernelExecutor};

// Render handoff
pub use crate::render::{RenderFrame, RenderParams, RenderSink, VolumeBounds};
