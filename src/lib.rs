// src/lib.rs
//! Cumulus
//!
//! A grid-based volumetric cloud/fluid density simulator driven by compute
//! kernels. The numerical pipeline (advection, Jacobi diffusion, pressure
//! projection, source injection, decay) runs over double-buffered 3D fields
//! through an opaque kernel-execution backend: wgpu compute pipelines on
//! the GPU, or a bit-for-bit reference executor on the CPU. A host calls
//! `step(dt)` once per frame and receives render parameters through a sink.

pub mod error;
pub mod field;
pub mod grid;
pub mod kernel;
pub mod render;
pub mod sim;
pub mod wgpu_utils;

pub mod prelude;

// Re-export main types for convenience
pub use error::SimError;
pub use sim::CloudSimulation;

/// Creates a simulation over the CPU reference executor with default
/// parameters.
pub fn default(dims: grid::GridDims) -> Result<CloudSimulation<kernel::CpuKernels>, SimError> {
    CloudSimulation::new(kernel::CpuKernels::new(), dims, Default::default())
}
