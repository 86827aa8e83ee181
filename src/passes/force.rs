use glam::Vec2;

use crate::field::Field;
use crate::pointer::Stroke;

/// Blends velocity toward the pointer's motion along the stroke segment.
///
/// Weight is `exp(-dist / radius) * tapering^2`; with no stroke the field
/// is copied through unchanged.
pub fn apply_forces(velocity: &Field<2>, out: &mut Field<2>, stroke: Option<&Stroke>, radius: f32) {
    let Some(stroke) = stroke else {
        out.copy_from(velocity);
        return;
    };
    let grid = velocity.grid();
    let target = stroke.cell_velocity * grid.cell_size();
    out.fill_with_index(|x, y| {
        let (cx, cy) = grid.cell_center(x, y);
        let (dist, fp) = stroke.measure(Vec2::new(cx, cy));
        let taper = Stroke::tapering(fp);
        let m = (-dist / radius).exp() * taper * taper;
        let v = velocity.get(x, y);
        [v[0] + (target.x - v[0]) * m, v[1] + (target.y - v[1]) * m]
    });
}
