// src/sim/mod.rs
//! Simulation driver
//!
//! Parameters, procedural source synthesis, and the per-frame pipeline.

pub mod params;
pub mod source;
pub mod stepper;

pub use params::{
    diffusion_coefficients, duty_cycle_multiplier, SimulationParams, SourceLayout, SourceParams,
};
pub use source::{CloudBlob, SourceSynthesizer, SOURCE_SEED};
pub use stepper::CloudSimulation;
