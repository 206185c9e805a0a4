// src/error.rs
//! Error taxonomy for the simulation core
//!
//! Only configuration, allocation and dispatch failures cross the library
//! boundary. Everything else (missing optional kernels, non-positive frame
//! times) is resolved locally by the component that detects it.

use crate::field::FieldHandle;
use crate::kernel::Kernel;

/// Errors surfaced by the simulation core.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Grid dimensions must be strictly positive on every axis.
    #[error("invalid grid dimensions {0}x{1}x{2}")]
    InvalidDims(u32, u32, u32),

    /// A required compute kernel could not be resolved at startup.
    #[error("required kernel `{0}` not found")]
    MissingKernel(Kernel),

    /// Field allocation failed; the simulation cannot run without its
    /// working set.
    #[error("field allocation failed: {0}")]
    Allocation(String),

    /// A stale or foreign field handle was passed to an executor.
    #[error("unknown field handle {0:?}")]
    UnknownField(FieldHandle),

    /// The compute substrate rejected or failed a dispatch. Fatal to the
    /// frame; never retried on stale ping-pong state.
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),
}
