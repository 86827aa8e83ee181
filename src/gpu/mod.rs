//! wgpu executor: the same passes as [`crate::passes`], run as WGSL compute
//! kernels over storage buffers.

mod params;
mod solver;

pub use params::GpuParams;
pub use solver::GpuSolver;

use crate::error::{Result, SimError};
use crate::field::Capabilities;
use crate::passes::Pass;

pub const WORKGROUP_SIZE: u32 = 8;

/// Shared declarations prepended to every kernel.
pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

pub const KERNELS: [(Pass, &str); 8] = [
    (Pass::AdvectVelocity, include_str!("shaders/advect_velocity.wgsl")),
    (Pass::ApplyForces, include_str!("shaders/apply_forces.wgsl")),
    (Pass::Divergence, include_str!("shaders/divergence.wgsl")),
    (Pass::Pressure, include_str!("shaders/jacobi.wgsl")),
    (Pass::SubtractGradient, include_str!("shaders/subtract_gradient.wgsl")),
    (Pass::UpdateDye, include_str!("shaders/update_dye.wgsl")),
    (Pass::AdvectDye, include_str!("shaders/advect_dye.wgsl")),
    (Pass::UpdateParticles, include_str!("shaders/update_particles.wgsl")),
];

/// Full source of a kernel, common prelude included.
pub fn kernel_source(body: &str) -> String {
    format!("{COMMON_WGSL}\n{body}")
}

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    caps: Capabilities,
}

impl GpuContext {
    /// Opens the default adapter and checks what the passes need.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| SimError::NoAdapter(e.to_string()))?;

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(SimError::Capability("adapter cannot run compute shaders".into()));
        }
        let float_storage = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| SimError::Device(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("gpu adapter: {} ({:?})", info.name, info.backend);
        if !float_storage {
            log::warn!("adapter lacks float storage; dye falls back to 8-bit");
        }
        Ok(Self { device, queue, info, caps: Capabilities { float_storage } })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn backend_name(&self) -> String {
        format!("{:?}/wgpu", self.info.backend).to_lowercase()
    }

    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }
}

pub(crate) fn mk_pipeline(device: &wgpu::Device, label: &str, wgsl: &str) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &shader,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

pub(crate) fn mk_storage(device: &wgpu::Device, label: &str, bytes: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: bytes as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub(crate) fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    let _ = device.poll(wgpu::PollType::wait_indefinitely());
    rx.recv()
        .map_err(|_| SimError::Readback("map_async channel closed".into()))?
        .map_err(|e| SimError::Readback(e.to_string()))
}

/// Copies a storage buffer back to the host as `f32`s.
pub(crate) fn read_f32(ctx: &GpuContext, src: &wgpu::Buffer) -> Result<Vec<f32>> {
    let size = src.size();
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    map_wait(&ctx.device, &slice)?;
    let values = {
        let mapped = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
    };
    staging.unmap();
    Ok(values)
}
