// src/kernel/mod.rs
//! Kernel dispatch facade
//!
//! Names the compute kernels of the pipeline, the uniform block they all
//! share, and the executor trait that both backends implement. The
//! simulation driver is generic over [`KernelExecutor`] and contains no
//! backend-specific code.
//!
//! Every kernel uses the same bind group shape: three storage-buffer slots
//! (`a`, `b`, `c`) plus one uniform block. Slot roles per kernel:
//!
//! | kernel              | a                  | b              | c             |
//! |---------------------|--------------------|----------------|---------------|
//! | `init_velocity`     | velocity (rw)      | -              | -             |
//! | `divergence`        | velocity (r)       | divergence (w) | pressure (w)  |
//! | `pressure_jacobi`   | pressure read (r)  | divergence (r) | pressure (w)  |
//! | `subtract_gradient` | velocity (rw)      | pressure (r)   | -             |
//! | `inject_sphere`     | density (rw)       | -              | -             |
//! | `add_source`        | density (rw)       | source (r)     | -             |
//! | `diffuse`           | density buf 0 (rw) | density buf 1 (rw) | -         |
//! | `advect`            | density read (r)   | velocity (r)   | density (w)   |
//! | `decay`             | density (rw)       | -              | -             |
//!
//! Binding a wrong-shaped field to a slot is a caller contract violation;
//! the result is numerically undefined, not a recoverable error.

pub mod cpu;
pub mod gpu;

pub use cpu::CpuKernels;
pub use gpu::GpuKernels;

use crate::error::SimError;
use crate::field::{FieldHandle, FieldKind};
use crate::grid::GridDims;

/// Bundled WGSL module; one entry point per [`Kernel`].
pub const FLUID_WGSL: &str = include_str!("fluid.wgsl");

/// Identity of a compute kernel in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    InitVelocity,
    Divergence,
    PressureJacobi,
    SubtractGradient,
    InjectSphere,
    AddSource,
    Diffuse,
    Advect,
    Decay,
}

impl Kernel {
    pub const ALL: [Kernel; 9] = [
        Kernel::InitVelocity,
        Kernel::Divergence,
        Kernel::PressureJacobi,
        Kernel::SubtractGradient,
        Kernel::InjectSphere,
        Kernel::AddSource,
        Kernel::Diffuse,
        Kernel::Advect,
        Kernel::Decay,
    ];

    /// Shader entry point name.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Kernel::InitVelocity => "init_velocity",
            Kernel::Divergence => "divergence",
            Kernel::PressureJacobi => "pressure_jacobi",
            Kernel::SubtractGradient => "subtract_gradient",
            Kernel::InjectSphere => "inject_sphere",
            Kernel::AddSource => "add_source",
            Kernel::Diffuse => "diffuse",
            Kernel::Advect => "advect",
            Kernel::Decay => "decay",
        }
    }

    /// Required kernels abort construction when missing; optional ones only
    /// disable their stage for the instance lifetime.
    pub fn is_required(&self) -> bool {
        matches!(self, Kernel::Advect | Kernel::Diffuse)
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Resolved kernel, ready to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelHandle(pub(crate) Kernel);

impl KernelHandle {
    pub fn kernel(&self) -> Kernel {
        self.0
    }
}

/// Sphere-injection combine mode carried in [`KernelUniforms::inject_mode`].
pub const INJECT_MAX: u32 = 0;
pub const INJECT_ADD: u32 = 1;

/// Uniform block shared by every kernel.
///
/// Layout mirrors the WGSL `Params` struct exactly; a size assertion in the
/// tests keeps the two in lockstep.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniforms {
    pub grid_size: [u32; 3],
    /// Jacobi pass parity; selects which diffusion buffer is the source.
    pub parity: u32,
    pub dt: f32,
    pub alpha: f32,
    pub r_beta: f32,
    pub decay_rate: f32,
    pub source_pos: [f32; 3],
    pub source_radius: f32,
    pub velocity: [f32; 3],
    pub source_amount: f32,
    pub source_scale: f32,
    pub cell_size: f32,
    pub inject_mode: u32,
    pub _pad: u32,
}

impl KernelUniforms {
    /// Baseline uniforms for a grid; stages overwrite what they use.
    pub fn for_grid(dims: GridDims) -> Self {
        Self {
            grid_size: [dims.nx, dims.ny, dims.nz],
            parity: 0,
            dt: 0.0,
            alpha: 0.0,
            r_beta: 0.0,
            decay_rate: 0.0,
            source_pos: [0.0; 3],
            source_radius: 0.0,
            velocity: [0.0; 3],
            source_amount: 0.0,
            source_scale: 0.0,
            cell_size: 1.0,
            inject_mode: INJECT_MAX,
            _pad: 0,
        }
    }
}

/// Fields bound to the three storage slots of a dispatch.
///
/// Unused slots stay `None`; the GPU backend fills them with a dummy buffer
/// to satisfy the fixed layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bindings {
    pub a: Option<FieldHandle>,
    pub b: Option<FieldHandle>,
    pub c: Option<FieldHandle>,
}

impl Bindings {
    pub fn one(a: FieldHandle) -> Self {
        Self {
            a: Some(a),
            ..Default::default()
        }
    }

    pub fn two(a: FieldHandle, b: FieldHandle) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            c: None,
        }
    }

    pub fn three(a: FieldHandle, b: FieldHandle, c: FieldHandle) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            c: Some(c),
        }
    }
}

/// The opaque kernel-execution capability.
///
/// Covers both the GridBuffer Manager contract (allocate/release) and the
/// dispatch facade (resolve/dispatch). Implementations: [`GpuKernels`]
/// (wgpu compute pipelines) and [`CpuKernels`] (reference executor over
/// `Vec<f32>` storage with identical tile semantics).
pub trait KernelExecutor {
    /// Allocates a zero-initialized field over `dims`.
    fn allocate(&mut self, dims: GridDims, kind: FieldKind) -> Result<FieldHandle, SimError>;

    /// Releases a field. Using the handle afterwards is an error.
    fn release(&mut self, field: FieldHandle) -> Result<(), SimError>;

    /// Resolves a kernel once at startup. `None` means the capability is
    /// absent; the caller decides whether that is fatal.
    fn resolve(&self, kernel: Kernel) -> Option<KernelHandle>;

    /// Issues one dispatch covering the whole grid (`ceil(dim/8)` workgroups
    /// per axis). Dispatch failures are fatal to the frame.
    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        dims: GridDims,
        bindings: &Bindings,
        uniforms: &KernelUniforms,
    ) -> Result<(), SimError>;

    /// Reads a field back to host memory (length = cells x channels).
    fn read_field(&mut self, field: FieldHandle) -> Result<Vec<f32>, SimError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_match_wgsl_params_block() {
        // The WGSL Params struct is five 16-byte rows.
        assert_eq!(std::mem::size_of::<KernelUniforms>(), 80);
        assert_eq!(std::mem::align_of::<KernelUniforms>(), 4);
    }

    #[test]
    fn test_every_kernel_has_a_wgsl_entry_point() {
        for kernel in Kernel::ALL {
            let needle = format!("fn {}(", kernel.entry_point());
            assert!(
                FLUID_WGSL.contains(&needle),
                "missing entry point for {kernel}"
            );
        }
    }

    #[test]
    fn test_required_kernels() {
        let required: Vec<_> = Kernel::ALL.iter().filter(|k| k.is_required()).collect();
        assert_eq!(required, [&Kernel::Diffuse, &Kernel::Advect]);
    }
}
