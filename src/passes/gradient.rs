use super::sample_neumann;
use crate::field::Field;

/// Projects velocity onto its divergence-free part by removing the pressure
/// gradient.
pub fn subtract_gradient(pressure: &Field<1>, velocity: &Field<2>, out: &mut Field<2>) {
    assert_eq!(pressure.grid(), velocity.grid(), "pressure and velocity grids differ");
    let half_rdx = 0.5 / velocity.grid().cell_size();
    out.fill_with_index(|x, y| {
        let l = sample_neumann(pressure, x, y, -1, 0)[0];
        let r = sample_neumann(pressure, x, y, 1, 0)[0];
        let b = sample_neumann(pressure, x, y, 0, -1)[0];
        let t = sample_neumann(pressure, x, y, 0, 1)[0];
        let v = velocity.get(x, y);
        [v[0] - half_rdx * (r - l), v[1] - half_rdx * (t - b)]
    });
}
