use bytemuck::{Pod, Zeroable};

use crate::passes::FrameInputs;

/// Uniform block shared by every kernel; mirrors `Params` in common.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuParams {
    pub width: u32,
    pub height: u32,
    pub particle_side: u32,
    pub pointer_down: u32,
    pub dt: f32,
    pub cell_size: f32,
    pub aspect: f32,
    pub force_radius: f32,
    pub velocity_dissipation: f32,
    pub dye_dissipation: f32,
    pub dye_decay: f32,
    pub dye_intensity: f32,
    pub color_mode: u32,
    pub dye_unorm8: u32,
    pub particle_drag: f32,
    pub particle_speed: f32,
    pub flow_scale: f32,
    pub stroke_speed: f32,
    pub _pad0: f32,
    pub _pad1: f32,
    pub stroke_head: [f32; 2],
    pub stroke_tail: [f32; 2],
    /// Force target in simulation units per second.
    pub stroke_target: [f32; 2],
    pub _pad2: [f32; 2],
}

impl GpuParams {
    pub fn new(
        inputs: &FrameInputs,
        (width, height): (u32, u32),
        cell_size: f32,
        particle_side: u32,
        dye_unorm8: bool,
    ) -> Self {
        let mut params = Self {
            width,
            height,
            particle_side,
            pointer_down: 0,
            dt: inputs.dt,
            cell_size,
            aspect: inputs.particles.aspect,
            force_radius: inputs.force_radius,
            velocity_dissipation: inputs.velocity_dissipation,
            dye_dissipation: crate::passes::DYE_ADVECT_DISSIPATION,
            dye_decay: inputs.dye.decay,
            dye_intensity: inputs.dye.intensity,
            color_mode: inputs.dye.color_mode,
            dye_unorm8: dye_unorm8 as u32,
            particle_drag: inputs.particles.drag,
            particle_speed: inputs.particles.speed,
            flow_scale: inputs.particles.flow_scale,
            ..Zeroable::zeroed()
        };
        if let Some(stroke) = &inputs.stroke {
            params.pointer_down = 1;
            params.stroke_speed = stroke.speed();
            params.stroke_head = stroke.head.to_array();
            params.stroke_tail = stroke.tail.to_array();
            params.stroke_target = (stroke.cell_velocity * cell_size).to_array();
        }
        params
    }
}
