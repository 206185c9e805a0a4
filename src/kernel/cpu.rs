// src/kernel/cpu.rs
//! CPU reference executor
//!
//! Runs the same kernels as the WGSL module over `Vec<f32>` storage,
//! iterating workgroup-by-workgroup with the same tile-8 bounds-guard
//! semantics. Makes the whole pipeline testable headlessly and doubles as
//! the fallback when no GPU adapter is available.

use std::collections::{HashMap, HashSet};

use crate::error::SimError;
use crate::field::{FieldHandle, FieldKind};
use crate::grid::{GridDims, TILE_SIZE};
use crate::kernel::{
    Bindings, Kernel, KernelExecutor, KernelHandle, KernelUniforms, INJECT_MAX,
};

struct CpuField {
    data: Vec<f32>,
}

/// Reference executor over host memory.
pub struct CpuKernels {
    fields: HashMap<u64, CpuField>,
    next_id: u64,
    kernels: HashSet<Kernel>,
}

impl CpuKernels {
    /// Executor with every kernel available.
    pub fn new() -> Self {
        Self::with_kernels(Kernel::ALL)
    }

    /// Executor with a subset of kernels, for exercising the
    /// optional-capability paths.
    pub fn with_kernels(kernels: impl IntoIterator<Item = Kernel>) -> Self {
        Self {
            fields: HashMap::new(),
            next_id: 1,
            kernels: kernels.into_iter().collect(),
        }
    }

    fn field(&self, handle: FieldHandle) -> Result<&CpuField, SimError> {
        self.fields
            .get(&handle.0)
            .ok_or(SimError::UnknownField(handle))
    }

    fn take_data(&mut self, handle: FieldHandle) -> Result<Vec<f32>, SimError> {
        let field = self
            .fields
            .get_mut(&handle.0)
            .ok_or(SimError::UnknownField(handle))?;
        Ok(std::mem::take(&mut field.data))
    }

    fn put_data(&mut self, handle: FieldHandle, data: Vec<f32>) {
        if let Some(field) = self.fields.get_mut(&handle.0) {
            field.data = data;
        }
    }

    fn slot(kernel: Kernel, slot: Option<FieldHandle>) -> Result<FieldHandle, SimError> {
        slot.ok_or_else(|| SimError::Dispatch(format!("kernel `{kernel}`: slot not bound")))
    }
}

impl Default for CpuKernels {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the grid in dispatch order: workgroups outer, 8x8x8 lanes inner,
/// skipping out-of-bounds invocations exactly like the shader guard.
fn for_each_cell(dims: GridDims, mut body: impl FnMut(u32, u32, u32)) {
    let (wx, wy, wz) = dims.workgroups();
    for gz in 0..wz {
        for gy in 0..wy {
            for gx in 0..wx {
                for lz in 0..TILE_SIZE {
                    for ly in 0..TILE_SIZE {
                        for lx in 0..TILE_SIZE {
                            let (i, j, k) =
                                (gx * TILE_SIZE + lx, gy * TILE_SIZE + ly, gz * TILE_SIZE + lz);
                            if dims.contains(i, j, k) {
                                body(i, j, k);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Clamped linear cell index, mirroring the WGSL `cell_index`.
#[inline]
fn cell_index(dims: GridDims, i: i64, j: i64, k: i64) -> usize {
    let ci = i.clamp(0, dims.nx as i64 - 1) as u32;
    let cj = j.clamp(0, dims.ny as i64 - 1) as u32;
    let ck = k.clamp(0, dims.nz as i64 - 1) as u32;
    dims.index(ci, cj, ck)
}

#[inline]
fn neighbor_sum(dims: GridDims, data: &[f32], i: i64, j: i64, k: i64) -> f32 {
    data[cell_index(dims, i + 1, j, k)]
        + data[cell_index(dims, i - 1, j, k)]
        + data[cell_index(dims, i, j + 1, k)]
        + data[cell_index(dims, i, j - 1, k)]
        + data[cell_index(dims, i, j, k + 1)]
        + data[cell_index(dims, i, j, k - 1)]
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn trilinear(dims: GridDims, data: &[f32], pos: [f32; 3]) -> f32 {
    let (x0, y0, z0) = (
        pos[0].floor() as i64,
        pos[1].floor() as i64,
        pos[2].floor() as i64,
    );
    let (fx, fy, fz) = (
        pos[0] - pos[0].floor(),
        pos[1] - pos[1].floor(),
        pos[2] - pos[2].floor(),
    );

    let c000 = data[cell_index(dims, x0, y0, z0)];
    let c100 = data[cell_index(dims, x0 + 1, y0, z0)];
    let c010 = data[cell_index(dims, x0, y0 + 1, z0)];
    let c110 = data[cell_index(dims, x0 + 1, y0 + 1, z0)];
    let c001 = data[cell_index(dims, x0, y0, z0 + 1)];
    let c101 = data[cell_index(dims, x0 + 1, y0, z0 + 1)];
    let c011 = data[cell_index(dims, x0, y0 + 1, z0 + 1)];
    let c111 = data[cell_index(dims, x0 + 1, y0 + 1, z0 + 1)];

    let c00 = mix(c000, c100, fx);
    let c10 = mix(c010, c110, fx);
    let c01 = mix(c001, c101, fx);
    let c11 = mix(c011, c111, fx);
    let c0 = mix(c00, c10, fy);
    let c1 = mix(c01, c11, fy);
    mix(c0, c1, fz)
}

impl KernelExecutor for CpuKernels {
    fn allocate(&mut self, dims: GridDims, kind: FieldKind) -> Result<FieldHandle, SimError> {
        dims.validate()?;
        let handle = FieldHandle(self.next_id);
        self.next_id += 1;
        self.fields.insert(
            handle.0,
            CpuField {
                data: vec![0.0; kind.len(dims)],
            },
        );
        Ok(handle)
    }

    fn release(&mut self, field: FieldHandle) -> Result<(), SimError> {
        self.fields
            .remove(&field.0)
            .map(|_| ())
            .ok_or(SimError::UnknownField(field))
    }

    fn resolve(&self, kernel: Kernel) -> Option<KernelHandle> {
        self.kernels.contains(&kernel).then_some(KernelHandle(kernel))
    }

    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        dims: GridDims,
        bindings: &Bindings,
        uniforms: &KernelUniforms,
    ) -> Result<(), SimError> {
        let kernel = kernel.0;
        if !self.kernels.contains(&kernel) {
            return Err(SimError::Dispatch(format!("kernel `{kernel}` not resolved")));
        }

        match kernel {
            Kernel::InitVelocity => {
                let vel = Self::slot(kernel, bindings.a)?;
                let mut data = self.take_data(vel)?;
                for_each_cell(dims, |i, j, k| {
                    let base = dims.index(i, j, k) * 4;
                    data[base] = uniforms.velocity[0];
                    data[base + 1] = uniforms.velocity[1];
                    data[base + 2] = uniforms.velocity[2];
                    data[base + 3] = 0.0;
                });
                self.put_data(vel, data);
            }

            Kernel::Divergence => {
                let vel = Self::slot(kernel, bindings.a)?;
                let div = Self::slot(kernel, bindings.b)?;
                let pressure = Self::slot(kernel, bindings.c)?;
                let mut div_data = self.take_data(div)?;
                let mut pressure_data = self.take_data(pressure)?;
                {
                    let v = &self.field(vel)?.data;
                    let scale = 0.5 / uniforms.cell_size;
                    for_each_cell(dims, |i, j, k| {
                        let (i, j, k) = (i as i64, j as i64, k as i64);
                        let xr = v[cell_index(dims, i + 1, j, k) * 4];
                        let xl = v[cell_index(dims, i - 1, j, k) * 4];
                        let yt = v[cell_index(dims, i, j + 1, k) * 4 + 1];
                        let yb = v[cell_index(dims, i, j - 1, k) * 4 + 1];
                        let zf = v[cell_index(dims, i, j, k + 1) * 4 + 2];
                        let zk = v[cell_index(dims, i, j, k - 1) * 4 + 2];
                        let idx = cell_index(dims, i, j, k);
                        div_data[idx] = scale * ((xr - xl) + (yt - yb) + (zf - zk));
                        pressure_data[idx] = 0.0;
                    });
                }
                self.put_data(div, div_data);
                self.put_data(pressure, pressure_data);
            }

            Kernel::PressureJacobi => {
                let p_read = Self::slot(kernel, bindings.a)?;
                let div = Self::slot(kernel, bindings.b)?;
                let p_write = Self::slot(kernel, bindings.c)?;
                let mut out = self.take_data(p_write)?;
                {
                    let p = &self.field(p_read)?.data;
                    let d = &self.field(div)?.data;
                    let cell2 = uniforms.cell_size * uniforms.cell_size;
                    for_each_cell(dims, |i, j, k| {
                        let (i, j, k) = (i as i64, j as i64, k as i64);
                        let idx = cell_index(dims, i, j, k);
                        let sum = neighbor_sum(dims, p, i, j, k);
                        out[idx] = (sum - d[idx] * cell2) / 6.0;
                    });
                }
                self.put_data(p_write, out);
            }

            Kernel::SubtractGradient => {
                let vel = Self::slot(kernel, bindings.a)?;
                let pressure = Self::slot(kernel, bindings.b)?;
                let mut v = self.take_data(vel)?;
                {
                    let p = &self.field(pressure)?.data;
                    let scale = 0.5 / uniforms.cell_size;
                    for_each_cell(dims, |i, j, k| {
                        let (i, j, k) = (i as i64, j as i64, k as i64);
                        let gx = p[cell_index(dims, i + 1, j, k)] - p[cell_index(dims, i - 1, j, k)];
                        let gy = p[cell_index(dims, i, j + 1, k)] - p[cell_index(dims, i, j - 1, k)];
                        let gz = p[cell_index(dims, i, j, k + 1)] - p[cell_index(dims, i, j, k - 1)];
                        let base = cell_index(dims, i, j, k) * 4;
                        v[base] -= gx * scale;
                        v[base + 1] -= gy * scale;
                        v[base + 2] -= gz * scale;
                    });
                }
                self.put_data(vel, v);
            }

            Kernel::InjectSphere => {
                let density = Self::slot(kernel, bindings.a)?;
                let mut data = self.take_data(density)?;
                let pos = uniforms.source_pos;
                let radius = uniforms.source_radius;
                for_each_cell(dims, |i, j, k| {
                    let dx = i as f32 - pos[0];
                    let dy = j as f32 - pos[1];
                    let dz = k as f32 - pos[2];
                    let dist = (dx * dx + dy * dy + dz * dz).sqrt();
                    if dist >= radius {
                        return;
                    }
                    let falloff = 1.0 - smoothstep(0.0, radius, dist);
                    let contribution = uniforms.source_amount * falloff;
                    let idx = dims.index(i, j, k);
                    if uniforms.inject_mode == INJECT_MAX {
                        data[idx] = data[idx].max(contribution);
                    } else {
                        data[idx] += contribution;
                    }
                });
                self.put_data(density, data);
            }

            Kernel::AddSource => {
                let density = Self::slot(kernel, bindings.a)?;
                let source = Self::slot(kernel, bindings.b)?;
                let mut data = self.take_data(density)?;
                {
                    let src = &self.field(source)?.data;
                    for_each_cell(dims, |i, j, k| {
                        let idx = dims.index(i, j, k);
                        data[idx] += uniforms.source_scale * src[idx];
                    });
                }
                self.put_data(density, data);
            }

            Kernel::Diffuse => {
                let buf0 = Self::slot(kernel, bindings.a)?;
                let buf1 = Self::slot(kernel, bindings.b)?;
                // Even parity reads buffer 0 and writes buffer 1; odd parity
                // the reverse. The anchor term is always the invocation's own
                // cell of buffer 0, read before it is overwritten.
                let (src, dst) = if uniforms.parity == 0 {
                    (buf0, buf1)
                } else {
                    (buf1, buf0)
                };
                let mut out = self.take_data(dst)?;
                if uniforms.parity == 0 {
                    let s = &self.field(src)?.data;
                    for_each_cell(dims, |i, j, k| {
                        let (i, j, k) = (i as i64, j as i64, k as i64);
                        let idx = cell_index(dims, i, j, k);
                        let sum = neighbor_sum(dims, s, i, j, k);
                        out[idx] = (sum + uniforms.alpha * s[idx]) * uniforms.r_beta;
                    });
                } else {
                    // dst is buffer 0, which also holds the anchor values;
                    // `out` still contains them until each cell is written.
                    let s = &self.field(src)?.data;
                    for_each_cell(dims, |i, j, k| {
                        let (i, j, k) = (i as i64, j as i64, k as i64);
                        let idx = cell_index(dims, i, j, k);
                        let sum = neighbor_sum(dims, s, i, j, k);
                        out[idx] = (sum + uniforms.alpha * out[idx]) * uniforms.r_beta;
                    });
                }
                self.put_data(dst, out);
            }

            Kernel::Advect => {
                let src = Self::slot(kernel, bindings.a)?;
                let vel = Self::slot(kernel, bindings.b)?;
                let dst = Self::slot(kernel, bindings.c)?;
                let mut out = self.take_data(dst)?;
                {
                    let d = &self.field(src)?.data;
                    let v = &self.field(vel)?.data;
                    let hi = [
                        dims.nx as f32 - 1.0,
                        dims.ny as f32 - 1.0,
                        dims.nz as f32 - 1.0,
                    ];
                    for_each_cell(dims, |i, j, k| {
                        let idx = dims.index(i, j, k);
                        let base = idx * 4;
                        let pos = [
                            (i as f32 - v[base] * uniforms.dt).clamp(0.0, hi[0]),
                            (j as f32 - v[base + 1] * uniforms.dt).clamp(0.0, hi[1]),
                            (k as f32 - v[base + 2] * uniforms.dt).clamp(0.0, hi[2]),
                        ];
                        out[idx] = trilinear(dims, d, pos);
                    });
                }
                self.put_data(dst, out);
            }

            Kernel::Decay => {
                let density = Self::slot(kernel, bindings.a)?;
                let mut data = self.take_data(density)?;
                let factor = (-uniforms.decay_rate * uniforms.dt).exp();
                for_each_cell(dims, |i, j, k| {
                    data[dims.index(i, j, k)] *= factor;
                });
                self.put_data(density, data);
            }
        }

        Ok(())
    }

    fn read_field(&mut self, field: FieldHandle) -> Result<Vec<f32>, SimError> {
        Ok(self.field(field)?.data.clone())
    }
}
