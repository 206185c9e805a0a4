// src/kernel/gpu.rs
//! wgpu compute executor
//!
//! Compiles one compute pipeline per entry point found in the (possibly
//! host-replaced) WGSL module, stores fields in storage buffers, and issues
//! each dispatch inside a validation error scope so substrate failures
//! surface as `SimError::Dispatch` instead of device-lost callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::{BindGroup, ComputePipeline, Device, Queue};

use crate::error::SimError;
use crate::field::{FieldHandle, FieldKind};
use crate::grid::GridDims;
use crate::kernel::{
    Bindings, Kernel, KernelExecutor, KernelHandle, KernelUniforms, FLUID_WGSL,
};
use crate::wgpu_utils::{
    binding_types,
    uniform_buffer::{ArrayBuffer, UniformBuffer},
    BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
};

struct GpuField {
    kind: FieldKind,
    dims: GridDims,
    buffer: ArrayBuffer<f32>,
}

/// Kernel executor backed by wgpu compute pipelines.
pub struct GpuKernels {
    device: Arc<Device>,
    queue: Arc<Queue>,
    pipelines: HashMap<Kernel, ComputePipeline>,
    layout: BindGroupLayoutWithDesc,
    fields: HashMap<u64, GpuField>,
    uniforms: UniformBuffer<KernelUniforms>,
    // Bound to unused storage slots; the shared layout has a fixed shape.
    dummy: wgpu::Buffer,
    next_id: u64,
}

impl GpuKernels {
    /// Executor over the bundled WGSL module.
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        Self::with_source(device, queue, FLUID_WGSL)
    }

    /// Executor over a host-supplied WGSL module. Entry points absent from
    /// the source simply fail to resolve; the caller decides what that
    /// means per kernel.
    pub fn with_source(device: Arc<Device>, queue: Arc<Queue>, source: &str) -> Self {
        let layout = BindGroupLayoutBuilder::new()
            .next_binding_compute(binding_types::storage_buffer_read_write()) // buf_a
            .next_binding_compute(binding_types::storage_buffer_read_write()) // buf_b
            .next_binding_compute(binding_types::storage_buffer_read_write()) // buf_c
            .next_binding_compute(binding_types::uniform()) // params
            .create(&device, "Fluid Kernel Layout");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Kernels"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Pipeline Layout"),
            bind_group_layouts: &[&layout.layout],
            push_constant_ranges: &[],
        });

        // Scan the source for each entry point before building its pipeline;
        // a missing kernel is resolved as absent, never a shader error.
        let mut pipelines = HashMap::new();
        for kernel in Kernel::ALL {
            let needle = format!("fn {}(", kernel.entry_point());
            if !source.contains(&needle) {
                continue;
            }
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.entry_point()),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(kernel.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });
            pipelines.insert(kernel, pipeline);
        }

        let uniforms = UniformBuffer::new(&device);
        let dummy = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fluid Dummy Slot"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            pipelines,
            layout,
            fields: HashMap::new(),
            uniforms,
            dummy,
            next_id: 1,
        }
    }

    /// Device limits required by the 8x8x8 workgroups (512 invocations
    /// exceed the 256 of `Limits::default()`).
    pub fn required_limits() -> wgpu::Limits {
        wgpu::Limits {
            max_compute_invocations_per_workgroup: 512,
            ..wgpu::Limits::default()
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn slot_buffer(&self, slot: Option<FieldHandle>) -> Result<&wgpu::Buffer, SimError> {
        match slot {
            Some(handle) => self
                .fields
                .get(&handle.0)
                .map(|f| f.buffer.buffer())
                .ok_or(SimError::UnknownField(handle)),
            None => Ok(&self.dummy),
        }
    }

    fn bind_group(&self, bindings: &Bindings) -> Result<BindGroup, SimError> {
        Ok(BindGroupBuilder::new(&self.layout)
            .buffer(self.slot_buffer(bindings.a)?)
            .buffer(self.slot_buffer(bindings.b)?)
            .buffer(self.slot_buffer(bindings.c)?)
            .resource(self.uniforms.binding_resource())
            .create(&self.device, "Fluid Bind Group"))
    }
}

impl KernelExecutor for GpuKernels {
    fn allocate(&mut self, dims: GridDims, kind: FieldKind) -> Result<FieldHandle, SimError> {
        dims.validate()?;

        self.device
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = ArrayBuffer::new(&self.device, kind.len(dims), false);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SimError::Allocation(err.to_string()));
        }

        let handle = FieldHandle(self.next_id);
        self.next_id += 1;
        self.fields.insert(handle.0, GpuField { kind, dims, buffer });
        Ok(handle)
    }

    fn release(&mut self, field: FieldHandle) -> Result<(), SimError> {
        self.fields
            .remove(&field.0)
            .map(|_| ())
            .ok_or(SimError::UnknownField(field))
    }

    fn resolve(&self, kernel: Kernel) -> Option<KernelHandle> {
        self.pipelines
            .contains_key(&kernel)
            .then_some(KernelHandle(kernel))
    }

    fn dispatch(
        &mut self,
        kernel: KernelHandle,
        dims: GridDims,
        bindings: &Bindings,
        uniforms: &KernelUniforms,
    ) -> Result<(), SimError> {
        let pipeline = self
            .pipelines
            .get(&kernel.0)
            .ok_or_else(|| SimError::Dispatch(format!("kernel `{}` not resolved", kernel.0)))?;

        self.uniforms.update_content(&self.queue, *uniforms);
        let bind_group = self.bind_group(bindings)?;
        let (wx, wy, wz) = dims.workgroups();

        self.device
            .push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.0.entry_point()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.0.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, wz);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SimError::Dispatch(err.to_string()));
        }
        Ok(())
    }

    fn read_field(&mut self, field: FieldHandle) -> Result<Vec<f32>, SimError> {
        let gpu_field = self
            .fields
            .get(&field.0)
            .ok_or(SimError::UnknownField(field))?;
        let len = gpu_field.kind.len(gpu_field.dims);

        let staging = ArrayBuffer::<f32>::new_staging(&self.device, len);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Field Readback"),
            });
        encoder.copy_buffer_to_buffer(
            gpu_field.buffer.buffer(),
            0,
            staging.buffer(),
            0,
            (len * std::mem::size_of::<f32>()) as u64,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.buffer().slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::MaintainBase::Wait);

        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {
                let mapped = slice.get_mapped_range();
                let result: Vec<f32> = bytemuck::cast_slice(&mapped).to_vec();
                drop(mapped);
                staging.buffer().unmap();
                Ok(result)
            }
            _ => Err(SimError::Dispatch("failed to map staging buffer".into())),
        }
    }
}
