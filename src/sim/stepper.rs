// src/sim/stepper.rs
//! The per-frame simulation pipeline
//!
//! One `step(dt)` call per external tick drives the stage sequence:
//! velocity initialization, pressure projection, source injection,
//! diffusion, advection, decay, publish. Each stage is a separate kernel
//! dispatch with explicit buffer roles; ping-pong stages swap handles after
//! every pass. Stages whose kernel failed to resolve at startup are
//! permanently skipped (warned once); dispatch failures are fatal to the
//! frame and propagate without retry.

use crate::error::SimError;
use crate::field::{DoubleBuffered, FieldHandle, FieldKind, FieldSet};
use crate::grid::GridDims;
use crate::kernel::{
    Bindings, Kernel, KernelExecutor, KernelHandle, KernelUniforms, INJECT_ADD,
};
use crate::render::{RenderFrame, RenderParams, RenderSink, VolumeBounds};
use crate::sim::params::{diffusion_coefficients, duty_cycle_multiplier, SimulationParams};
use crate::sim::source::SourceSynthesizer;

/// Manual injection site radius, in cells (clamped to fit small grids).
const MANUAL_SOURCE_RADIUS: f32 = 25.0;

/// Density added per second while the manual injection flag is held.
const MANUAL_SOURCE_RATE: f32 = 0.5;

/// Kernels resolved once at startup. Advection and diffusion are required;
/// every other stage degrades to a no-op when its kernel is absent.
struct StageKernels {
    advect: KernelHandle,
    diffuse: KernelHandle,
    init_velocity: Option<KernelHandle>,
    divergence: Option<KernelHandle>,
    pressure_jacobi: Option<KernelHandle>,
    subtract_gradient: Option<KernelHandle>,
    inject_sphere: Option<KernelHandle>,
    add_source: Option<KernelHandle>,
    decay: Option<KernelHandle>,
}

impl StageKernels {
    fn resolve<E: KernelExecutor>(executor: &E) -> Result<Self, SimError> {
        let required = |kernel: Kernel| {
            executor
                .resolve(kernel)
                .ok_or(SimError::MissingKernel(kernel))
        };
        let optional = |kernel: Kernel, stage: &str| {
            let handle = executor.resolve(kernel);
            if handle.is_none() {
                log::warn!("kernel `{kernel}` not found; {stage} stage disabled");
            }
            handle
        };

        Ok(Self {
            advect: required(Kernel::Advect)?,
            diffuse: required(Kernel::Diffuse)?,
            init_velocity: optional(Kernel::InitVelocity, "velocity initialization"),
            divergence: optional(Kernel::Divergence, "pressure projection"),
            pressure_jacobi: optional(Kernel::PressureJacobi, "pressure projection"),
            subtract_gradient: optional(Kernel::SubtractGradient, "pressure projection"),
            inject_sphere: optional(Kernel::InjectSphere, "source injection"),
            add_source: optional(Kernel::AddSource, "continuous source"),
            decay: optional(Kernel::Decay, "lifecycle decay"),
        })
    }

    /// Projection needs all three of its kernels.
    fn projection(&self) -> Option<(KernelHandle, KernelHandle, KernelHandle)> {
        Some((
            self.divergence?,
            self.pressure_jacobi?,
            self.subtract_gradient?,
        ))
    }
}

/// A complete cloud/fluid density simulation instance.
///
/// Generic over the kernel-execution backend; the pipeline itself contains
/// no backend-specific code. `&mut self` on `step` makes re-entrant ticking
/// impossible, which protects ping-pong buffer ownership.
pub struct CloudSimulation<E: KernelExecutor> {
    executor: E,
    dims: GridDims,
    /// Host-mutated configuration, read-only within a step.
    pub params: SimulationParams,
    /// Parameters forwarded untouched to the renderer.
    pub render: RenderParams,
    bounds: VolumeBounds,
    fields: FieldSet,
    kernels: StageKernels,
    source: SourceSynthesizer,
    source_timer: f32,
    manual_source: bool,
    frames: u64,
    sink: Option<Box<dyn RenderSink>>,
    latest: Option<RenderFrame>,
}

impl<E: KernelExecutor> CloudSimulation<E> {
    /// Startup: resolves kernels, allocates the working set, and builds the
    /// initial source field. The only place a configuration error can
    /// surface; a constructed instance always runs.
    pub fn new(
        mut executor: E,
        dims: GridDims,
        params: SimulationParams,
    ) -> Result<Self, SimError> {
        dims.validate()?;
        let kernels = StageKernels::resolve(&executor)?;

        let density = DoubleBuffered::new(
            executor.allocate(dims, FieldKind::Scalar)?,
            executor.allocate(dims, FieldKind::Scalar)?,
        );
        let pressure = DoubleBuffered::new(
            executor.allocate(dims, FieldKind::Scalar)?,
            executor.allocate(dims, FieldKind::Scalar)?,
        );
        let fields = FieldSet {
            density,
            pressure,
            divergence: executor.allocate(dims, FieldKind::Scalar)?,
            velocity: executor.allocate(dims, FieldKind::Vector)?,
        };

        let mut source = SourceSynthesizer::new();
        source.build(&mut executor, dims, &params.source, kernels.inject_sphere)?;

        let bounds = VolumeBounds::centered(dims, params.cell_size);
        log::info!(
            "cloud simulation ready: grid {}x{}x{}, source {:?}",
            dims.nx,
            dims.ny,
            dims.nz,
            params.source.layout
        );

        Ok(Self {
            executor,
            dims,
            params,
            render: RenderParams::default(),
            bounds,
            fields,
            kernels,
            source,
            source_timer: 0.0,
            manual_source: false,
            frames: 0,
            sink: None,
            latest: None,
        })
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Ticks that actually ran (skipped ticks do not count).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The field holding the latest density iterate.
    pub fn density(&self) -> FieldHandle {
        self.fields.density.current()
    }

    pub fn bounds(&self) -> VolumeBounds {
        self.bounds
    }

    /// World-space bounds derived from the host transform, computed once.
    pub fn set_bounds(&mut self, bounds: VolumeBounds) {
        self.bounds = bounds;
    }

    /// Host input flag: inject density at the manual site while held.
    pub fn set_manual_source(&mut self, held: bool) {
        self.manual_source = held;
    }

    /// Registers the rendering collaborator.
    pub fn set_sink(&mut self, sink: Box<dyn RenderSink>) {
        self.sink = Some(sink);
    }

    /// The last published frame, for polling hosts.
    pub fn latest_frame(&self) -> Option<&RenderFrame> {
        self.latest.as_ref()
    }

    /// The velocity field, for hosts and diagnostics.
    pub fn velocity(&self) -> FieldHandle {
        self.fields.velocity
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Reads the current density field back to host memory.
    pub fn read_density(&mut self) -> Result<Vec<f32>, SimError> {
        self.executor.read_field(self.fields.density.current())
    }

    fn uniforms(&self, dt: f32) -> KernelUniforms {
        KernelUniforms {
            dt,
            cell_size: self.params.cell_size,
            ..KernelUniforms::for_grid(self.dims)
        }
    }

    /// Advances the simulation by one frame. A non-positive `dt` skips the
    /// entire step: no mutation, no dispatch, no publish.
    pub fn step(&mut self, dt: f32) -> Result<(), SimError> {
        if dt <= 0.0 {
            return Ok(());
        }

        // Source rebuild happens between ticks, never mid-pipeline.
        self.source.build(
            &mut self.executor,
            self.dims,
            &self.params.source,
            self.kernels.inject_sphere,
        )?;

        self.init_velocity(dt)?;
        self.project_velocity(dt)?;
        self.inject_sources(dt)?;
        self.diffuse(dt)?;
        self.advect(dt)?;
        self.decay(dt)?;

        self.frames += 1;
        self.publish();
        Ok(())
    }

    /// Teardown: releases every field and hands the executor back.
    pub fn shutdown(mut self) -> Result<E, SimError> {
        for handle in self.fields.handles() {
            self.executor.release(handle)?;
        }
        self.source.release(&mut self.executor)?;
        log::info!("cloud simulation shut down after {} frames", self.frames);
        Ok(self.executor)
    }

    /// Stage 1: overwrite velocity uniformly every frame (not accumulated).
    fn init_velocity(&mut self, dt: f32) -> Result<(), SimError> {
        if !self.params.uniform_velocity {
            return Ok(());
        }
        let Some(kernel) = self.kernels.init_velocity else {
            return Ok(());
        };
        let v = self.params.initial_velocity;
        let uniforms = KernelUniforms {
            velocity: [v.x, v.y, v.z],
            ..self.uniforms(dt)
        };
        self.executor.dispatch(
            kernel,
            self.dims,
            &Bindings::one(self.fields.velocity),
            &uniforms,
        )
    }

    /// Stage 2: divergence, Jacobi relaxation, gradient subtraction.
    fn project_velocity(&mut self, dt: f32) -> Result<(), SimError> {
        if !self.params.project_velocity {
            return Ok(());
        }
        let Some((divergence, jacobi, subtract)) = self.kernels.projection() else {
            return Ok(());
        };
        let uniforms = self.uniforms(dt);

        // (a) divergence of velocity; clears the to-be-read pressure buffer.
        self.executor.dispatch(
            divergence,
            self.dims,
            &Bindings::three(
                self.fields.velocity,
                self.fields.divergence,
                self.fields.pressure.current(),
            ),
            &uniforms,
        )?;

        // (b) Jacobi relaxation, alternating the two pressure buffers. Zero
        // iterations still applies (a) and (c) with the cleared field.
        for _ in 0..self.params.pressure_iterations {
            self.executor.dispatch(
                jacobi,
                self.dims,
                &Bindings::three(
                    self.fields.pressure.current(),
                    self.fields.divergence,
                    self.fields.pressure.scratch(),
                ),
                &uniforms,
            )?;
            self.fields.pressure.swap();
        }

        // (c) subtract the pressure gradient from velocity in place.
        self.executor.dispatch(
            subtract,
            self.dims,
            &Bindings::two(self.fields.velocity, self.fields.pressure.current()),
            &uniforms,
        )
    }

    /// Stage 3: constant source injection plus the manual injection site.
    fn inject_sources(&mut self, dt: f32) -> Result<(), SimError> {
        if self.params.continuous_source {
            let scale = if self.params.smart_source_injection {
                let m = duty_cycle_multiplier(self.source_timer, self.params.source_cycle_time);
                self.source_timer += dt;
                if self.source_timer >= self.params.source_cycle_time {
                    self.source_timer = 0.0;
                }
                self.params.source_scale * m
            } else {
                self.params.source_scale
            };

            if let (Some(kernel), Some(source)) = (self.kernels.add_source, self.source.field()) {
                let uniforms = KernelUniforms {
                    source_scale: scale,
                    ..self.uniforms(dt)
                };
                self.executor.dispatch(
                    kernel,
                    self.dims,
                    &Bindings::two(self.fields.density.current(), source),
                    &uniforms,
                )?;
            }
        }

        if self.manual_source {
            if let Some(kernel) = self.kernels.inject_sphere {
                let radius = MANUAL_SOURCE_RADIUS.min(self.dims.min_extent() as f32 / 2.0);
                let uniforms = KernelUniforms {
                    source_pos: [
                        self.dims.nx as f32 / 2.0,
                        self.dims.ny as f32 / 4.0,
                        self.dims.nz as f32 / 2.0,
                    ],
                    source_radius: radius,
                    source_amount: MANUAL_SOURCE_RATE * dt,
                    inject_mode: INJECT_ADD,
                    ..self.uniforms(dt)
                };
                self.executor.dispatch(
                    kernel,
                    self.dims,
                    &Bindings::one(self.fields.density.current()),
                    &uniforms,
                )?;
            }
        }
        Ok(())
    }

    /// Stage 4: iterative implicit diffusion on density.
    fn diffuse(&mut self, dt: f32) -> Result<(), SimError> {
        if self.params.diffusion_rate <= 0.0 || self.params.diffusion_iterations == 0 {
            return Ok(());
        }
        let (alpha, r_beta) =
            diffusion_coefficients(self.params.cell_size, self.params.diffusion_rate, dt);

        // The anchor binding stays pinned to the buffer holding density at
        // stage start; parity tells the kernel which buffer is the source
        // of the pass.
        let buf0 = self.fields.density.current();
        let buf1 = self.fields.density.scratch();
        for pass in 0..self.params.diffusion_iterations {
            let uniforms = KernelUniforms {
                alpha,
                r_beta,
                parity: pass % 2,
                ..self.uniforms(dt)
            };
            self.executor.dispatch(
                self.kernels.diffuse,
                self.dims,
                &Bindings::two(buf0, buf1),
                &uniforms,
            )?;
            self.fields.density.swap();
        }
        Ok(())
    }

    /// Stage 5: semi-Lagrangian transport of density by velocity.
    fn advect(&mut self, dt: f32) -> Result<(), SimError> {
        self.executor.dispatch(
            self.kernels.advect,
            self.dims,
            &Bindings::three(
                self.fields.density.current(),
                self.fields.velocity,
                self.fields.density.scratch(),
            ),
            &self.uniforms(dt),
        )?;
        self.fields.density.swap();
        Ok(())
    }

    /// Stage 6: exponential density decay in place.
    fn decay(&mut self, dt: f32) -> Result<(), SimError> {
        if self.params.decay_rate <= 0.0 {
            return Ok(());
        }
        let Some(kernel) = self.kernels.decay else {
            return Ok(());
        };
        let uniforms = KernelUniforms {
            decay_rate: self.params.decay_rate,
            ..self.uniforms(dt)
        };
        self.executor.dispatch(
            kernel,
            self.dims,
            &Bindings::one(self.fields.density.current()),
            &uniforms,
        )
    }

    /// Stage 7: hand the frame to the rendering collaborator.
    fn publish(&mut self) {
        let frame = RenderFrame {
            density: self.fields.density.current(),
            dims: self.dims,
            bounds: self.bounds,
            params: self.render,
            frame: self.frames,
        };
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(&frame);
        }
        self.latest = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::CpuKernels;

    fn quiet_params() -> SimulationParams {
        SimulationParams {
            continuous_source: false,
            diffusion_rate: 0.0,
            decay_rate: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_required_kernel_fails_construction() {
        let exec = CpuKernels::with_kernels([Kernel::Diffuse]);
        let result = CloudSimulation::new(exec, GridDims::new(8, 8, 8), quiet_params());
        assert!(matches!(
            result,
            Err(SimError::MissingKernel(Kernel::Advect))
        ));
    }

    #[test]
    fn test_missing_optional_kernel_still_constructs_and_steps() {
        let exec = CpuKernels::with_kernels([Kernel::Advect, Kernel::Diffuse]);
        let mut sim =
            CloudSimulation::new(exec, GridDims::new(8, 8, 8), SimulationParams::default())
                .unwrap();
        sim.set_manual_source(true);
        sim.params.project_velocity = true;
        sim.params.decay_rate = 1.0;
        // Every optional stage is silently skipped.
        sim.step(0.016).unwrap();
        assert_eq!(sim.frames(), 1);
    }

    #[test]
    fn test_non_positive_dt_is_a_silent_no_op() {
        let mut sim = CloudSimulation::new(
            CpuKernels::new(),
            GridDims::new(8, 8, 8),
            SimulationParams::default(),
        )
        .unwrap();
        sim.step(0.016).unwrap();
        let before = sim.read_density().unwrap();
        let frames = sim.frames();

        sim.step(0.0).unwrap();
        sim.step(-1.0).unwrap();
        assert_eq!(sim.read_density().unwrap(), before);
        assert_eq!(sim.frames(), frames);
        assert!(sim.latest_frame().is_some());
    }

    #[test]
    fn test_invalid_dims_fail_construction() {
        let result = CloudSimulation::new(
            CpuKernels::new(),
            GridDims::new(0, 8, 8),
            SimulationParams::default(),
        );
        assert!(matches!(result, Err(SimError::InvalidDims(0, 8, 8))));
    }

    #[test]
    fn test_source_timer_wraps_to_exactly_zero() {
        let mut sim = CloudSimulation::new(
            CpuKernels::new(),
            GridDims::new(8, 8, 8),
            SimulationParams {
                smart_source_injection: true,
                source_cycle_time: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..4 {
            sim.step(0.25).unwrap();
        }
        // 4 x 0.25 reaches the cycle boundary exactly.
        assert_eq!(sim.source_timer, 0.0);
    }

    #[test]
    fn test_shutdown_returns_the_executor() {
        let sim = CloudSimulation::new(
            CpuKernels::new(),
            GridDims::new(8, 8, 8),
            SimulationParams::default(),
        )
        .unwrap();
        let density = sim.density();
        let mut exec = sim.shutdown().unwrap();
        // Every field was released.
        assert!(matches!(
            exec.read_field(density),
            Err(SimError::UnknownField(_))
        ));
    }
}
