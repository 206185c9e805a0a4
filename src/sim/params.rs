// src/sim/params.rs
//! Simulation parameters and stage coefficients
//!
//! Plain structs with reference defaults, mutated directly by the host
//! between ticks and read-only within a step.

use cgmath::Vector3;

/// Procedural layouts for the source-density field. The three variants the
/// original near-duplicates hard-coded, folded into one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    /// One sphere at the grid center.
    CenterSphere,
    /// `cloud_count` spheres biased toward the horizontal center and the
    /// vertical lower-middle of the volume.
    Scattered,
    /// `2 * cloud_count` flatter blobs biased into the lower third.
    Layered,
}

/// Parameters governing the source-density field. The synthesizer rebuilds
/// the field only when these change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    pub layout: SourceLayout,
    pub cloud_count: u32,
    pub cloud_radius: f32,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            layout: SourceLayout::Scattered,
            cloud_count: 8,
            cloud_radius: 12.0,
        }
    }
}

/// Per-instance simulation configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// World units per cell.
    pub cell_size: f32,
    /// Diffusion strength; zero disables the stage.
    pub diffusion_rate: f32,
    /// Jacobi passes per diffusion stage.
    pub diffusion_iterations: u32,
    /// Exponential density decay rate; zero disables the stage.
    pub decay_rate: f32,
    /// Jacobi passes of the pressure solve. Zero skips relaxation but the
    /// projection still computes divergence and subtracts the (unrelaxed)
    /// pressure gradient.
    pub pressure_iterations: u32,
    /// Enables the pressure-projection stage.
    pub project_velocity: bool,
    /// Overwrites velocity uniformly with `initial_velocity` every frame.
    pub uniform_velocity: bool,
    /// Velocity in cells per second for uniform-velocity mode.
    pub initial_velocity: Vector3<f32>,
    /// Enables constant injection of the source field into density.
    pub continuous_source: bool,
    /// Scale applied to the source field on injection.
    pub source_scale: f32,
    /// Modulates injection with a raised-cosine duty cycle.
    pub smart_source_injection: bool,
    /// Seconds per full fade-in/fade-out cycle.
    pub source_cycle_time: f32,
    pub source: SourceParams,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            diffusion_rate: 0.05,
            diffusion_iterations: 5,
            decay_rate: 0.0,
            pressure_iterations: 20,
            project_velocity: false,
            uniform_velocity: false,
            initial_velocity: Vector3::new(0.0, 0.0, 0.0),
            continuous_source: true,
            source_scale: 1.0,
            smart_source_injection: false,
            source_cycle_time: 10.0,
            source: SourceParams::default(),
        }
    }
}

/// Implicit-diffusion Jacobi coefficients for the 7-point 3D Laplacian.
///
/// `alpha = cell_size^2 / (rate * dt)`, `r_beta = 1 / (6 + alpha)`; the 6
/// is the axis-aligned neighbor count in 3D. Small `dt` or low rate gives
/// large `alpha` and thus less smoothing per pass.
pub fn diffusion_coefficients(cell_size: f32, rate: f32, dt: f32) -> (f32, f32) {
    let alpha = (cell_size * cell_size) / (rate * dt);
    (alpha, 1.0 / (6.0 + alpha))
}

/// Raised-cosine injection multiplier: 1.0 at cycle start, ~0 at mid-cycle,
/// back to 1.0 at the wrap, so there is no snap discontinuity.
pub fn duty_cycle_multiplier(timer: f32, cycle_time: f32) -> f32 {
    if cycle_time <= 0.0 {
        return 1.0;
    }
    0.5 + 0.5 * (std::f32::consts::TAU * timer / cycle_time).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diffusion_coefficients_identity() {
        for &(cell, rate, dt) in &[(1.0f32, 0.05f32, 0.016f32), (0.5, 1.0, 0.1), (2.0, 0.2, 1.0)] {
            let (alpha, r_beta) = diffusion_coefficients(cell, rate, dt);
            assert!((alpha - cell * cell / (rate * dt)).abs() < 1e-3);
            assert!((r_beta - 1.0 / (6.0 + alpha)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_diffusion_vanishes_with_frame_time() {
        // dt -> 0+ gives alpha -> infinity and r_beta -> 0: near-identity.
        let (alpha_a, r_beta_a) = diffusion_coefficients(1.0, 0.05, 1e-3);
        let (alpha_b, r_beta_b) = diffusion_coefficients(1.0, 0.05, 1e-6);
        assert!(alpha_b > alpha_a);
        assert!(r_beta_b < r_beta_a);
        assert!(r_beta_b < 1e-4);
    }

    #[test]
    fn test_duty_cycle_fade() {
        let cycle = 4.0;
        assert!((duty_cycle_multiplier(0.0, cycle) - 1.0).abs() < 1e-6);
        assert!(duty_cycle_multiplier(cycle / 2.0, cycle).abs() < 1e-6);
        assert!(duty_cycle_multiplier(cycle - 1e-3, cycle) > 0.999);
        // Degenerate cycle time means no modulation.
        assert_eq!(duty_cycle_multiplier(1.0, 0.0), 1.0);
    }
}
