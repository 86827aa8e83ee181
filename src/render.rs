//! Composites the dye field and the particle swarm into an RGBA8 frame.

use rayon::prelude::*;

use crate::particles::ParticleSystem;
use crate::quality::Viewport;
use crate::state::SimulationState;

pub const PARTICLE_ALPHA: f32 = 0.35;

/// Output image; row 0 is the top of the display (clip y = +1).
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<[u8; 4]>,
}

impl Frame {
    pub fn new(viewport: Viewport) -> Self {
        let width = viewport.width as usize;
        let height = viewport.height as usize;
        Self { width, height, pixels: vec![[0, 0, 0, 255]; width * height] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        self.pixels[y * self.width + x]
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_flattened()
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Particle brightness from its clip-space speed.
fn particle_glow(vx: f32, vy: f32) -> f32 {
    (0.25 + ((vx * vx + vy * vy).sqrt() * 0.5).min(0.75)) * PARTICLE_ALPHA
}

pub fn composite(state: &SimulationState, particles: &ParticleSystem, frame: &mut Frame) {
    let (w, h) = (frame.width, frame.height);

    let mut glow = vec![0.0f32; w * h];
    if let Some(swarm) = particles.state() {
        for &[px, py, vx, vy] in swarm.cells() {
            let sx = ((px + 1.0) * 0.5 * w as f32).floor();
            let sy = ((1.0 - py) * 0.5 * h as f32).floor();
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                continue;
            }
            glow[sy as usize * w + sx as usize] += particle_glow(vx, vy);
        }
    }

    let dye = state.dye.read();
    let gw = state.width() as f32;
    let gh = state.height() as f32;
    frame.pixels.par_iter_mut().enumerate().for_each(|(i, out)| {
        let x = i % w;
        let y = i / w;
        let gx = (x as f32 + 0.5) / w as f32 * gw;
        let gy = (1.0 - (y as f32 + 0.5) / h as f32) * gh;
        let d = dye.sample_bilinear((gx, gy));
        let g = glow[i];
        let tone = |c: f32| 1.0 - (-c.max(0.0)).exp();
        *out = [
            to_u8(tone(d[0]) + g),
            to_u8(tone(d[1]) + g),
            to_u8(tone(d[2]) + g),
            255,
        ];
    });
}
