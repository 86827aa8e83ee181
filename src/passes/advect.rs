use crate::field::Field;

/// Semi-Lagrangian transport of `source` through `velocity`.
///
/// Each cell traces back `dt * rdx * v` grid units and resamples the source
/// bilinearly, then scales by `dissipation`. Unconditionally stable; the
/// cost is numerical smoothing.
pub fn advect<const C: usize>(
    source: &Field<C>,
    velocity: &Field<2>,
    out: &mut Field<C>,
    dt: f32,
    dissipation: f32,
) {
    assert_eq!(source.grid(), velocity.grid(), "advected field must share the velocity grid");
    let rdx = 1.0 / velocity.grid().cell_size();
    out.fill_with_index(|x, y| {
        let v = velocity.get(x, y);
        let back = (
            x as f32 + 0.5 - dt * rdx * v[0],
            y as f32 + 0.5 - dt * rdx * v[1],
        );
        source.sample_bilinear(back).map(|s| s * dissipation)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Grid, Precision};

    #[test]
    fn still_flow_only_dissipates() {
        let grid = Grid::new(9, 7, 1.0 / 7.0);
        let still = Field::<2>::new(grid, Precision::Float32);
        let dye = Field::<4>::from_fn(grid, Precision::Float32, |x, y| {
            [x as f32 * 0.3, y as f32 * 1.7, (x * y) as f32, 1.0]
        });
        let mut out = Field::<4>::new(grid, Precision::Float32);
        advect(&dye, &still, &mut out, 0.016, 0.93);
        for y in 0..7 {
            for x in 0..9 {
                let expected = dye.get(x, y).map(|v| v * 0.93);
                assert_eq!(out.get(x, y), expected);
            }
        }
    }

    #[test]
    fn uniform_flow_shifts_by_whole_cells() {
        let grid = Grid::new(8, 4, 1.0);
        // one cell per step to the right
        let flow = Field::<2>::from_fn(grid, Precision::Float32, |_, _| [1.0, 0.0]);
        let ramp = Field::<1>::from_fn(grid, Precision::Float32, |x, _| [x as f32]);
        let mut out = Field::<1>::new(grid, Precision::Float32);
        advect(&ramp, &flow, &mut out, 1.0, 1.0);
        assert_eq!(out.get(5, 2), [4.0]);
        // the left edge clamps to the boundary sample
        assert_eq!(out.get(0, 1), [0.0]);
    }
}
