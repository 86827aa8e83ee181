//! The per-frame compute passes.
//!
//! Every pass reads finalized input fields and writes a separate output
//! field; no pass reads what it writes. Within a pass each cell is
//! independent, so the work is spread across the rayon pool. Passes run in
//! the fixed order of [`Pass::ORDER`].

mod advect;
mod divergence;
mod dye;
mod force;
mod gradient;
mod particles;
mod pressure;

pub use advect::advect;
pub use divergence::{divergence, divergence_energy};
pub use dye::{update_dye, DyeParams, DYE_ADVECT_DISSIPATION, DYE_RADIUS};
pub use force::apply_forces;
pub use gradient::subtract_gradient;
pub use particles::{update_particles, wrap_clip, ParticleParams, FLOW_SCALE};
pub use pressure::{jacobi_step, solve_pressure};

use crate::field::Field;
use crate::particles::ParticleSystem;
use crate::pointer::Stroke;
use crate::state::SimulationState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    AdvectVelocity,
    ApplyForces,
    Divergence,
    Pressure,
    SubtractGradient,
    UpdateDye,
    AdvectDye,
    UpdateParticles,
}

impl Pass {
    pub const ORDER: [Pass; 8] = [
        Pass::AdvectVelocity,
        Pass::ApplyForces,
        Pass::Divergence,
        Pass::Pressure,
        Pass::SubtractGradient,
        Pass::UpdateDye,
        Pass::AdvectDye,
        Pass::UpdateParticles,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Pass::AdvectVelocity => "advect-velocity",
            Pass::ApplyForces => "apply-forces",
            Pass::Divergence => "divergence",
            Pass::Pressure => "pressure",
            Pass::SubtractGradient => "subtract-gradient",
            Pass::UpdateDye => "update-dye",
            Pass::AdvectDye => "advect-dye",
            Pass::UpdateParticles => "update-particles",
        }
    }
}

/// Everything one frame's passes need besides the fields themselves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub dt: f32,
    pub stroke: Option<Stroke>,
    pub iterations: u32,
    pub velocity_dissipation: f32,
    pub force_radius: f32,
    pub dye: DyeParams,
    pub particles: ParticleParams,
}

/// Runs one frame on the CPU in [`Pass::ORDER`].
pub fn run_frame(state: &mut SimulationState, particles: &mut ParticleSystem, inputs: &FrameInputs) {
    let stroke = inputs.stroke.as_ref();
    state
        .velocity
        .step_with(|v, out| advect(v, v, out, inputs.dt, inputs.velocity_dissipation));
    state
        .velocity
        .step_with(|v, out| apply_forces(v, out, stroke, inputs.force_radius));
    divergence(state.velocity.read(), &mut state.divergence);
    solve_pressure(&mut state.pressure, &state.divergence, inputs.iterations);
    let pressure = state.pressure.read();
    state.velocity.step_with(|v, out| subtract_gradient(pressure, v, out));
    state.dye.step_with(|d, out| update_dye(d, out, stroke, &inputs.dye));
    let velocity = state.velocity.read();
    state
        .dye
        .step_with(|d, out| advect(d, velocity, out, inputs.dt, DYE_ADVECT_DISSIPATION));
    if let Some(swarm) = particles.buffer_mut() {
        swarm.step_with(|p, out| update_particles(p, velocity, out, &inputs.particles));
    }
}

/// Velocity neighbour with a solid-wall edge: the sample is reflected onto
/// the edge cell and the component normal to that edge is negated.
pub fn sample_free_slip(field: &Field<2>, x: usize, y: usize, dx: i32, dy: i32) -> [f32; 2] {
    let (mut v, rx, ry) = field.neighbor(x, y, dx, dy);
    if rx {
        v[0] = -v[0];
    }
    if ry {
        v[1] = -v[1];
    }
    v
}

/// Zero-gradient edge: the sample is reflected onto the edge cell unchanged.
pub fn sample_neumann<const C: usize>(field: &Field<C>, x: usize, y: usize, dx: i32, dy: i32) -> [f32; C] {
    field.neighbor(x, y, dx, dy).0
}
