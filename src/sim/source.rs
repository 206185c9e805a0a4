// src/sim/source.rs
//! Source synthesizer
//!
//! Builds the static source-density field from a procedural blob list
//! drawn from an explicit seeded generator, so identical parameters always
//! yield an identical field. Rebuilds only when the governing parameters
//! change; otherwise the same field handle persists across frames.

use cgmath::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SimError;
use crate::field::{FieldHandle, FieldKind};
use crate::grid::GridDims;
use crate::kernel::{Bindings, KernelExecutor, KernelHandle, KernelUniforms, INJECT_MAX};
use crate::sim::params::{SourceLayout, SourceParams};

/// Fixed seed of the reference behavior.
pub const SOURCE_SEED: u64 = 42;

/// Tolerance for detecting a cloud-radius change.
const RADIUS_EPSILON: f32 = 1e-4;

/// Reference injection radius of the center-sphere layout, in cells.
const CENTER_SPHERE_RADIUS: f32 = 30.0;

/// One procedural blob of the source description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudBlob {
    pub center: Vector3<f32>,
    pub radius: f32,
    pub density: f32,
}

/// Builds and owns the source-density field.
pub struct SourceSynthesizer {
    seed: u64,
    field: Option<FieldHandle>,
    last_built: Option<SourceParams>,
}

impl SourceSynthesizer {
    pub fn new() -> Self {
        Self::with_seed(SOURCE_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            field: None,
            last_built: None,
        }
    }

    /// The current source field, if one has been built.
    pub fn field(&self) -> Option<FieldHandle> {
        self.field
    }

    /// Deterministic blob list for the given parameters and grid.
    pub fn blobs(params: &SourceParams, dims: GridDims, seed: u64) -> Vec<CloudBlob> {
        let (nx, ny, nz) = (dims.nx as f32, dims.ny as f32, dims.nz as f32);
        let mut rng = StdRng::seed_from_u64(seed);

        match params.layout {
            SourceLayout::CenterSphere => {
                let radius = CENTER_SPHERE_RADIUS.min(dims.min_extent() as f32 / 2.0);
                vec![CloudBlob {
                    center: Vector3::new(nx / 2.0, ny / 2.0, nz / 2.0),
                    radius,
                    density: 1.0,
                }]
            }
            SourceLayout::Scattered => (0..params.cloud_count)
                .map(|_| {
                    let center = Vector3::new(
                        nx * (0.5 + rng.random_range(-0.3..0.3)),
                        ny * (0.3 + rng.random_range(-0.15..0.15)),
                        nz * (0.5 + rng.random_range(-0.3..0.3)),
                    );
                    CloudBlob {
                        center,
                        radius: params.cloud_radius * rng.random_range(0.7..1.3),
                        density: rng.random_range(0.8..1.2),
                    }
                })
                .collect(),
            SourceLayout::Layered => (0..2 * params.cloud_count)
                .map(|_| {
                    let center = Vector3::new(
                        nx * (0.5 + rng.random_range(-0.4..0.4)),
                        ny * (0.18 + rng.random_range(-0.12..0.12)),
                        nz * (0.5 + rng.random_range(-0.4..0.4)),
                    );
                    let horizontal = params.cloud_radius * rng.random_range(0.8..1.5);
                    // The injection primitive is a sphere, so the flattened
                    // ellipsoid (vertical radius 0.5x) becomes the average
                    // of its horizontal and vertical radii.
                    let radius = (horizontal + horizontal * 0.5) / 2.0;
                    CloudBlob {
                        center,
                        radius,
                        density: rng.random_range(0.6..1.1),
                    }
                })
                .collect(),
        }
    }

    /// Whether the given parameters differ from the last build.
    fn needs_rebuild(&self, params: &SourceParams) -> bool {
        match &self.last_built {
            None => true,
            Some(last) => {
                last.layout != params.layout
                    || last.cloud_count != params.cloud_count
                    || (last.cloud_radius - params.cloud_radius).abs() > RADIUS_EPSILON
            }
        }
    }

    /// Ensures the source field matches `params`, rebuilding if they
    /// changed since the last build. Returns the (possibly unchanged)
    /// field handle, or `None` when the injection kernel is unavailable.
    pub fn build<E: KernelExecutor>(
        &mut self,
        executor: &mut E,
        dims: GridDims,
        params: &SourceParams,
        inject: Option<KernelHandle>,
    ) -> Result<Option<FieldHandle>, SimError> {
        let Some(inject) = inject else {
            return Ok(None);
        };
        if !self.needs_rebuild(params) {
            return Ok(self.field);
        }

        // Rebuild discards and reallocates before regenerating.
        if let Some(old) = self.field.take() {
            executor.release(old)?;
        }
        let field = executor.allocate(dims, FieldKind::Scalar)?;

        let blobs = Self::blobs(params, dims, self.seed);
        log::debug!(
            "building source field: {:?}, {} blobs",
            params.layout,
            blobs.len()
        );
        for blob in &blobs {
            let uniforms = KernelUniforms {
                source_pos: [blob.center.x, blob.center.y, blob.center.z],
                source_radius: blob.radius,
                source_amount: blob.density,
                inject_mode: INJECT_MAX,
                ..KernelUniforms::for_grid(dims)
            };
            executor.dispatch(inject, dims, &Bindings::one(field), &uniforms)?;
        }

        self.field = Some(field);
        self.last_built = Some(*params);
        Ok(self.field)
    }

    /// Releases the source field at teardown.
    pub fn release<E: KernelExecutor>(&mut self, executor: &mut E) -> Result<(), SimError> {
        if let Some(field) = self.field.take() {
            executor.release(field)?;
        }
        self.last_built = None;
        Ok(())
    }
}

impl Default for SourceSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
