use glam::Vec2;

use crate::field::Field;

/// Simulation units to clip units: the grid height spans one simulation
/// unit and two clip units.
pub const FLOW_SCALE: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleParams {
    pub dt: f32,
    pub drag: f32,
    pub speed: f32,
    pub flow_scale: f32,
    pub aspect: f32,
}

/// Toroidal wrap into [-1, 1).
pub fn wrap_clip(v: f32) -> f32 {
    (v + 1.0).rem_euclid(2.0) - 1.0
}

/// Drags each particle toward the local flow and integrates its position.
/// Texels pack `(pos.x, pos.y, vel.x, vel.y)` in clip space.
pub fn update_particles(
    particles: &Field<4>,
    velocity: &Field<2>,
    out: &mut Field<4>,
    params: &ParticleParams,
) {
    let grid = velocity.grid();
    let to_clip = Vec2::new(params.flow_scale / params.aspect, params.flow_scale);
    out.fill_with_index(|x, y| {
        let [px, py, vx, vy] = particles.get(x, y);
        let flow = Vec2::from(velocity.sample_bilinear(grid.clip_to_grid((px, py)))) * to_clip;
        let mut vel = Vec2::new(vx, vy);
        vel += (flow - vel) * params.drag;
        let pos = Vec2::new(px, py) + vel * (params.dt * params.speed);
        [wrap_clip(pos.x), wrap_clip(pos.y), vel.x, vel.y]
    });
}
