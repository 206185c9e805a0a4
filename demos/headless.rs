// demos/headless.rs - headless demo driver
//! Runs the cloud simulation for a few seconds of simulated time and prints
//! density statistics. Uses the GPU backend when an adapter is available,
//! the CPU reference executor otherwise.

use std::sync::Arc;

use anyhow::Result;
use cgmath::Vector3;
use cumulus::prelude::*;

/// Counts published frames; stands in for a real ray-march renderer.
struct FrameCounter {
    frames: u64,
}

impl RenderSink for FrameCounter {
    fn publish(&mut self, frame: &RenderFrame) {
        self.frames += 1;
        log::debug!(
            "frame {} published: density field {:?}, bounds min {:?}",
            frame.frame,
            frame.density,
            frame.bounds.min
        );
    }
}

fn try_gpu() -> Option<GpuKernels> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok()?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Cumulus Device"),
        required_features: wgpu::Features::default(),
        required_limits: GpuKernels::required_limits(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: wgpu::Trace::Off,
    }))
    .ok()?;

    log::info!("using GPU adapter: {}", adapter.get_info().name);
    Some(GpuKernels::new(Arc::new(device), Arc::new(queue)))
}

fn run<E: KernelExecutor>(executor: E, backend: &str) -> Result<()> {
    let dims = GridDims::new(64, 64, 64);
    let params = SimulationParams {
        uniform_velocity: true,
        initial_velocity: Vector3::new(0.0, 3.0, 0.5),
        project_velocity: true,
        smart_source_injection: true,
        source_cycle_time: 6.0,
        decay_rate: 0.08,
        source: SourceParams {
            layout: SourceLayout::Layered,
            cloud_count: 6,
            cloud_radius: 10.0,
        },
        ..Default::default()
    };

    let mut sim = CloudSimulation::new(executor, dims, params)?;
    sim.set_bounds(VolumeBounds::from_transform(
        Vector3::new(0.0, 32.0, 0.0),
        Vector3::new(64.0, 64.0, 64.0),
    ));
    sim.set_sink(Box::new(FrameCounter { frames: 0 }));

    let dt = 1.0 / 60.0;
    for _ in 0..300 {
        sim.step(dt)?;
    }

    let density = sim.read_density()?;
    let total: f32 = density.iter().sum();
    let peak = density.iter().cloned().fold(0.0f32, f32::max);
    let occupied = density.iter().filter(|&&v| v > 0.01).count();
    println!(
        "[{backend}] {} frames: total density {total:.1}, peak {peak:.3}, {occupied} cells above 0.01",
        sim.frames()
    );

    sim.shutdown()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    match try_gpu() {
        Some(gpu) => run(gpu, "gpu"),
        None => {
            log::warn!("no GPU adapter available, falling back to the CPU executor");
            run(CpuKernels::new(), "cpu")
        }
    }
}
