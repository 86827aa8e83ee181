//! Scalar-to-colour ramps used when injecting dye.
//!
//! Each ramp is `base * x + (1 - base) * 0.85 * x^3`: zero at `x = 0`,
//! continuous, and non-decreasing in every channel. The WGSL copy in
//! `gpu/shaders/common.wgsl` must stay in sync with this table.

pub const PALETTE_BASES: [[f32; 3]; 8] = [
    [1.0, 0.35, 0.05],  // ember
    [0.05, 0.45, 1.0],  // ocean
    [0.1, 1.0, 0.55],   // aurora
    [0.6, 0.15, 1.0],   // violet
    [1.0, 0.8, 0.1],    // gold
    [1.0, 0.2, 0.5],    // rose
    [0.6, 0.9, 1.0],    // ice
    [0.8, 0.8, 0.8],    // mono
];

const HIGHLIGHT: f32 = 0.85;

pub fn palette(mode: u32, x: f32) -> [f32; 3] {
    let base = PALETTE_BASES[(mode as usize).min(PALETTE_BASES.len() - 1)];
    let x = x.clamp(0.0, 1.0);
    let x3 = x * x * x;
    base.map(|b| b * x + (1.0 - b) * HIGHLIGHT * x3)
}
