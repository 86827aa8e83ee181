use super::{mk_pipeline, mk_storage, read_f32, GpuContext, GpuParams, KERNELS, WORKGROUP_SIZE};
use crate::error::{Result, SimError};
use crate::field::Precision;
use crate::particles::ParticleSystem;
use crate::passes::{FrameInputs, Pass};
use crate::state::SimulationState;

struct GpuPipelines {
    advect_velocity: wgpu::ComputePipeline,
    apply_forces: wgpu::ComputePipeline,
    divergence: wgpu::ComputePipeline,
    jacobi: wgpu::ComputePipeline,
    subtract_gradient: wgpu::ComputePipeline,
    update_dye: wgpu::ComputePipeline,
    advect_dye: wgpu::ComputePipeline,
    update_particles: wgpu::ComputePipeline,
}

impl GpuPipelines {
    fn new(device: &wgpu::Device) -> Result<Self> {
        let build = |pass: Pass| -> Result<wgpu::ComputePipeline> {
            let body = KERNELS
                .iter()
                .find(|(p, _)| *p == pass)
                .map(|(_, body)| *body)
                .ok_or(SimError::Construction { pass: pass.label(), message: "no kernel".into() })?;
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = mk_pipeline(device, pass.label(), &super::kernel_source(body));
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                return Err(SimError::Construction { pass: pass.label(), message: err.to_string() });
            }
            Ok(pipeline)
        };
        Ok(Self {
            advect_velocity: build(Pass::AdvectVelocity)?,
            apply_forces: build(Pass::ApplyForces)?,
            divergence: build(Pass::Divergence)?,
            jacobi: build(Pass::Pressure)?,
            subtract_gradient: build(Pass::SubtractGradient)?,
            update_dye: build(Pass::UpdateDye)?,
            advect_dye: build(Pass::AdvectDye)?,
            update_particles: build(Pass::UpdateParticles)?,
        })
    }
}

struct GpuDoubleBuffer {
    slots: [wgpu::Buffer; 2],
    read: usize,
}

impl GpuDoubleBuffer {
    fn new(device: &wgpu::Device, label: &str, bytes: usize) -> Self {
        Self {
            slots: [
                mk_storage(device, &format!("{label}-a"), bytes),
                mk_storage(device, &format!("{label}-b"), bytes),
            ],
            read: 0,
        }
    }

    fn read(&self) -> &wgpu::Buffer {
        &self.slots[self.read]
    }

    fn write(&self) -> &wgpu::Buffer {
        &self.slots[1 - self.read]
    }

    fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    fn upload(&mut self, queue: &wgpu::Queue, values: &[f32]) {
        self.read = 0;
        queue.write_buffer(&self.slots[0], 0, bytemuck::cast_slice(values));
    }
}

/// Device-side copies of every field, sized for one grid.
struct GpuFields {
    width: u32,
    height: u32,
    cell_size: f32,
    particle_side: u32,
    dye_unorm8: bool,
    velocity: GpuDoubleBuffer,
    pressure: GpuDoubleBuffer,
    divergence: wgpu::Buffer,
    dye: GpuDoubleBuffer,
    particles: Option<GpuDoubleBuffer>,
}

impl GpuFields {
    fn new(device: &wgpu::Device, state: &SimulationState, particles: &ParticleSystem) -> Self {
        let cells = state.width() * state.height();
        let f = std::mem::size_of::<f32>();
        Self {
            width: state.width() as u32,
            height: state.height() as u32,
            cell_size: state.cell_size(),
            particle_side: particles.side() as u32,
            dye_unorm8: state.dye.read().precision() == Precision::Unorm8,
            velocity: GpuDoubleBuffer::new(device, "velocity", cells * 2 * f),
            pressure: GpuDoubleBuffer::new(device, "pressure", cells * f),
            divergence: mk_storage(device, "divergence", cells * f),
            dye: GpuDoubleBuffer::new(device, "dye", cells * 4 * f),
            particles: (particles.count() > 0)
                .then(|| GpuDoubleBuffer::new(device, "particles", particles.count() * 4 * f)),
        }
    }

    /// Like [`GpuFields::new`], but reports a grid the device cannot hold
    /// instead of leaving an invalid buffer behind.
    fn allocate(device: &wgpu::Device, state: &SimulationState, particles: &ParticleSystem) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fields = Self::new(device, state, particles);
        let invalid = pollster::block_on(device.pop_error_scope());
        let exhausted = pollster::block_on(device.pop_error_scope());
        match invalid.or(exhausted) {
            Some(err) => Err(SimError::Allocation(format!(
                "{}x{} grid, {} particles: {err}",
                state.width(),
                state.height(),
                particles.count()
            ))),
            None => Ok(fields),
        }
    }
}

/// Records one kernel dispatch. Binding 0 is always the params block; the
/// remaining buffers bind in order from 1.
fn dispatch(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::ComputePipeline,
    label: &str,
    params: &wgpu::Buffer,
    buffers: &[&wgpu::Buffer],
    groups: (u32, u32),
) {
    let mut entries = vec![wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() }];
    entries.extend(buffers.iter().enumerate().map(|(i, buffer)| wgpu::BindGroupEntry {
        binding: i as u32 + 1,
        resource: buffer.as_entire_binding(),
    }));
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &entries,
    });
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.dispatch_workgroups(groups.0, groups.1, 1);
}

pub struct GpuSolver {
    ctx: GpuContext,
    pipelines: GpuPipelines,
    params: wgpu::Buffer,
    fields: GpuFields,
}

impl GpuSolver {
    /// Builds every pass program and uploads the initial fields. Fails with
    /// [`SimError::Construction`] naming the first pass that does not build.
    pub fn new(ctx: GpuContext, state: &SimulationState, particles: &ParticleSystem) -> Result<Self> {
        let pipelines = GpuPipelines::new(&ctx.device)?;
        let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fields = GpuFields::allocate(&ctx.device, state, particles)?;
        let mut solver = Self { ctx, pipelines, params, fields };
        solver.upload(state, particles);
        Ok(solver)
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Replaces every buffer to match a freshly constructed state. On
    /// failure the previous buffers are kept.
    pub fn rebuild(&mut self, state: &SimulationState, particles: &ParticleSystem) -> Result<()> {
        self.fields = GpuFields::allocate(&self.ctx.device, state, particles)?;
        self.upload(state, particles);
        Ok(())
    }

    /// Writes the host fields into the read slots.
    pub fn upload(&mut self, state: &SimulationState, particles: &ParticleSystem) {
        let queue = &self.ctx.queue;
        let fields = &mut self.fields;
        fields.velocity.upload(queue, state.velocity.read().as_flat());
        fields.pressure.upload(queue, state.pressure.read().as_flat());
        queue.write_buffer(&fields.divergence, 0, bytemuck::cast_slice(state.divergence.as_flat()));
        fields.dye.upload(queue, state.dye.read().as_flat());
        if let (Some(buffer), Some(swarm)) = (fields.particles.as_mut(), particles.state()) {
            buffer.upload(queue, swarm.as_flat());
        }
    }

    /// Zeroes every device field and re-uploads the particle lattice.
    pub fn reset(&mut self, particles: &ParticleSystem) {
        let f = &mut self.fields;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("reset") });
        for pair in [&mut f.velocity, &mut f.pressure, &mut f.dye] {
            for slot in &pair.slots {
                encoder.clear_buffer(slot, 0, None);
            }
            pair.read = 0;
        }
        encoder.clear_buffer(&f.divergence, 0, None);
        self.ctx.queue.submit(Some(encoder.finish()));
        if let (Some(buffer), Some(swarm)) = (f.particles.as_mut(), particles.state()) {
            buffer.upload(&self.ctx.queue, swarm.as_flat());
        }
    }

    /// Encodes and submits one frame.
    pub fn step(&mut self, inputs: &FrameInputs) {
        let f = &mut self.fields;
        let params = GpuParams::new(inputs, (f.width, f.height), f.cell_size, f.particle_side, f.dye_unorm8);
        self.ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let device = &self.ctx.device;
        let p = &self.pipelines;
        let u = &self.params;
        let grid = (f.width.div_ceil(WORKGROUP_SIZE), f.height.div_ceil(WORKGROUP_SIZE));
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });

        dispatch(
            device,
            &mut encoder,
            &p.advect_velocity,
            Pass::AdvectVelocity.label(),
            u,
            &[f.velocity.read(), f.velocity.write()],
            grid,
        );
        f.velocity.swap();
        dispatch(
            device,
            &mut encoder,
            &p.apply_forces,
            Pass::ApplyForces.label(),
            u,
            &[f.velocity.read(), f.velocity.write()],
            grid,
        );
        f.velocity.swap();
        dispatch(
            device,
            &mut encoder,
            &p.divergence,
            Pass::Divergence.label(),
            u,
            &[f.velocity.read(), &f.divergence],
            grid,
        );
        for _ in 0..inputs.iterations {
            dispatch(
                device,
                &mut encoder,
                &p.jacobi,
                Pass::Pressure.label(),
                u,
                &[f.pressure.read(), &f.divergence, f.pressure.write()],
                grid,
            );
            f.pressure.swap();
        }
        dispatch(
            device,
            &mut encoder,
            &p.subtract_gradient,
            Pass::SubtractGradient.label(),
            u,
            &[f.pressure.read(), f.velocity.read(), f.velocity.write()],
            grid,
        );
        f.velocity.swap();
        dispatch(
            device,
            &mut encoder,
            &p.update_dye,
            Pass::UpdateDye.label(),
            u,
            &[f.dye.read(), f.dye.write()],
            grid,
        );
        f.dye.swap();
        dispatch(
            device,
            &mut encoder,
            &p.advect_dye,
            Pass::AdvectDye.label(),
            u,
            &[f.velocity.read(), f.dye.read(), f.dye.write()],
            grid,
        );
        f.dye.swap();
        if let Some(swarm) = f.particles.as_mut() {
            let side = f.particle_side.div_ceil(WORKGROUP_SIZE);
            dispatch(
                device,
                &mut encoder,
                &p.update_particles,
                Pass::UpdateParticles.label(),
                u,
                &[f.velocity.read(), swarm.read(), swarm.write()],
                (side, side),
            );
            swarm.swap();
        }

        self.ctx.queue.submit(Some(encoder.finish()));
    }

    /// Copies the device fields back into the host state.
    pub fn download(&self, state: &mut SimulationState, particles: &mut ParticleSystem) -> Result<()> {
        let f = &self.fields;
        let velocity = read_f32(&self.ctx, f.velocity.read())?;
        let pressure = read_f32(&self.ctx, f.pressure.read())?;
        let divergence = read_f32(&self.ctx, &f.divergence)?;
        let dye = read_f32(&self.ctx, f.dye.read())?;
        state.velocity.step_with(|_, dst| dst.copy_from_flat(&velocity));
        state.pressure.step_with(|_, dst| dst.copy_from_flat(&pressure));
        state.divergence.copy_from_flat(&divergence);
        state.dye.step_with(|_, dst| dst.copy_from_flat(&dye));
        if let (Some(buffer), Some(swarm)) = (f.particles.as_ref(), particles.buffer_mut()) {
            let values = read_f32(&self.ctx, buffer.read())?;
            swarm.step_with(|_, dst| dst.copy_from_flat(&values));
        }
        Ok(())
    }

    /// Blocks until all submitted work has finished.
    pub fn wait(&self) {
        let _ = self.ctx.device.poll(wgpu::PollType::wait_indefinitely());
    }
}
