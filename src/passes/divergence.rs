use super::sample_free_slip;
use crate::field::Field;

/// Central-difference divergence with solid-wall edges.
pub fn divergence(velocity: &Field<2>, out: &mut Field<1>) {
    let half_rdx = 0.5 / velocity.grid().cell_size();
    out.fill_with_index(|x, y| {
        let l = sample_free_slip(velocity, x, y, -1, 0);
        let r = sample_free_slip(velocity, x, y, 1, 0);
        let b = sample_free_slip(velocity, x, y, 0, -1);
        let t = sample_free_slip(velocity, x, y, 0, 1);
        [half_rdx * ((r[0] - l[0]) + (t[1] - b[1]))]
    });
}

/// Sum of squared divergence over the grid.
pub fn divergence_energy(div: &Field<1>) -> f64 {
    div.cells().iter().map(|d| (d[0] as f64) * (d[0] as f64)).sum()
}
