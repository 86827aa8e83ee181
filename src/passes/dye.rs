use glam::Vec2;

use crate::field::Field;
use crate::palette::palette;
use crate::pointer::Stroke;

/// Falloff radius for dye splats, in simulation units. Independent of the
/// configurable force radius.
pub const DYE_RADIUS: f32 = 0.03;

/// Dye fading happens in [`update_dye`]; transport itself is lossless.
pub const DYE_ADVECT_DISSIPATION: f32 = 1.0;

const SPEED_GAIN: f32 = 0.015;
const DISTANCE_PENALTY: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DyeParams {
    pub decay: f32,
    pub intensity: f32,
    pub color_mode: u32,
}

/// Fades the dye and splats new colour along the stroke. Alpha tracks the
/// brightest channel and is used as coverage by the compositor.
pub fn update_dye(dye: &Field<4>, out: &mut Field<4>, stroke: Option<&Stroke>, params: &DyeParams) {
    let grid = dye.grid();
    let speed2 = stroke.map_or(0.0, |s| s.speed() * s.speed());
    out.fill_with_index(|x, y| {
        let d = dye.get(x, y);
        let mut rgb = [d[0] * params.decay, d[1] * params.decay, d[2] * params.decay];
        if let Some(stroke) = stroke {
            let (cx, cy) = grid.cell_center(x, y);
            let (dist, fp) = stroke.measure(Vec2::new(cx, cy));
            let m = (-dist / DYE_RADIUS).exp();
            let level = ((speed2 * SPEED_GAIN - dist * DISTANCE_PENALTY) * Stroke::tapering(fp))
                .clamp(0.0, 1.0);
            let color = palette(params.color_mode, level);
            for c in 0..3 {
                rgb[c] += m * color[c] * params.intensity;
            }
        }
        let alpha = rgb[0].max(rgb[1]).max(rgb[2]).clamp(0.0, 1.0);
        [rgb[0], rgb[1], rgb[2], alpha]
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Grid, Precision};
    use crate::pointer::PointerState;

    fn params() -> DyeParams {
        DyeParams { decay: 0.5, intensity: 1.0, color_mode: 2 }
    }

    #[test]
    fn decays_without_a_stroke() {
        let grid = Grid::new(4, 4, 0.25);
        let dye = Field::<4>::from_fn(grid, Precision::Float32, |_, _| [0.8, 0.4, 0.2, 1.0]);
        let mut out = Field::<4>::new(grid, Precision::Float32);
        update_dye(&dye, &mut out, None, &params());
        assert_eq!(out.get(2, 2), [0.4, 0.2, 0.1, 0.4]);
    }

    #[test]
    fn splat_fades_with_distance() {
        let grid = Grid::new(48, 48, 1.0 / 48.0);
        let pointer = PointerState { x: 0.0, y: 0.0, prev_x: 0.0, prev_y: 0.05, down: true, moved: true };
        let stroke = Stroke::from_pointer(&pointer, grid, 0.01).unwrap();
        let dye = Field::<4>::new(grid, Precision::Float32);
        let mut out = Field::<4>::new(grid, Precision::Float32);
        update_dye(&dye, &mut out, Some(&stroke), &params());
        let energy = |x: usize| out.get(x, 24)[..3].iter().sum::<f32>();
        assert!(energy(24) > 0.0);
        for x in 24..30 {
            assert!(energy(x + 1) <= energy(x), "dye rose at column {}", x + 1);
        }
        assert!(energy(40) < energy(24) * 1e-3);
    }

    #[test]
    fn unorm8_dye_saturates() {
        let grid = Grid::new(16, 16, 1.0 / 16.0);
        let pointer = PointerState { x: 0.0, y: 0.0, prev_x: 0.0, prev_y: 0.2, down: true, moved: true };
        let stroke = Stroke::from_pointer(&pointer, grid, 0.01).unwrap();
        let dye = Field::<4>::new(grid, Precision::Unorm8);
        let mut out = Field::<4>::new(grid, Precision::Unorm8);
        let loud = DyeParams { intensity: 50.0, ..params() };
        update_dye(&dye, &mut out, Some(&stroke), &loud);
        assert!(out.cells().iter().all(|c| c.iter().all(|v| (0.0..=1.0).contains(v))));
    }
}
