//! Grid storage: fixed-shape fields and the two-slot ping-pong container.
//!
//! Cells are stored row-major with `y = 0` as the bottom row. Cell `(x, y)`
//! has its centre at `(x + 0.5, y + 0.5)` in grid space.

use rayon::prelude::*;
use std::sync::OnceLock;

const PAR_THRESHOLD_DEFAULT: usize = 16_384;
const PAR_MIN_WORK_PER_THREAD: usize = 2048;

fn parallel_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("FLUID_PAR_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(PAR_THRESHOLD_DEFAULT)
    })
}

fn should_parallel(len: usize) -> bool {
    if len < parallel_threshold() {
        return false;
    }
    let threads = rayon::current_num_threads().max(1);
    len / threads >= PAR_MIN_WORK_PER_THREAD
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    cell_size: f32,
}

impl Grid {
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        assert!(width > 0, "width must be > 0");
        assert!(height > 0, "height must be > 0");
        assert!(cell_size > 0.0, "cell_size must be > 0");
        Self { width, height, cell_size }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    /// Maps an out-of-range neighbour back onto the edge cell. The flag is
    /// true when the coordinate had to be reflected.
    pub fn reflect(&self, x: i32, y: i32) -> (usize, usize, bool, bool) {
        let max_x = self.width as i32 - 1;
        let max_y = self.height as i32 - 1;
        let rx = x < 0 || x > max_x;
        let ry = y < 0 || y > max_y;
        (x.clamp(0, max_x) as usize, y.clamp(0, max_y) as usize, rx, ry)
    }

    /// Cell centre in simulation space (grid space scaled by the cell size).
    pub fn cell_center(&self, x: usize, y: usize) -> (f32, f32) {
        (
            (x as f32 + 0.5) * self.cell_size,
            (y as f32 + 0.5) * self.cell_size,
        )
    }

    /// Grid-space position of a clip-space point, with [-1, 1] spanning the grid.
    pub fn clip_to_grid(&self, clip: (f32, f32)) -> (f32, f32) {
        (
            (clip.0 + 1.0) * 0.5 * self.width as f32,
            (clip.1 + 1.0) * 0.5 * self.height as f32,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Float32,
    /// Normalised 8-bit storage: values clamp to [0, 1] and quantize to k/255.
    Unorm8,
}

impl Precision {
    #[inline]
    pub fn store(self, value: f32) -> f32 {
        match self {
            Precision::Float32 => value,
            Precision::Unorm8 => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        }
    }
}

/// What the host's storage can hold; supplied by whoever negotiated the context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub float_storage: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { float_storage: true }
    }
}

impl Capabilities {
    /// Precision for the dye field, degrading when float storage is absent.
    pub fn dye_precision(&self) -> Precision {
        if self.float_storage {
            Precision::Float32
        } else {
            Precision::Unorm8
        }
    }
}

/// A `width x height` grid of `C`-component cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Field<const C: usize> {
    grid: Grid,
    precision: Precision,
    data: Vec<[f32; C]>,
}

impl<const C: usize> Field<C> {
    pub fn new(grid: Grid, precision: Precision) -> Self {
        Self {
            grid,
            precision,
            data: vec![[0.0; C]; grid.size()],
        }
    }

    pub fn from_fn(grid: Grid, precision: Precision, f: impl Fn(usize, usize) -> [f32; C] + Sync) -> Self {
        let mut field = Self::new(grid, precision);
        field.fill_with_index(f);
        field
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn get(&self, x: usize, y: usize) -> [f32; C] {
        self.data[self.grid.idx(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: [f32; C]) {
        let i = self.grid.idx(x, y);
        let precision = self.precision;
        self.data[i] = value.map(|v| precision.store(v));
    }

    pub fn cells(&self) -> &[[f32; C]] {
        &self.data
    }

    pub fn as_flat(&self) -> &[f32] {
        self.data.as_flattened()
    }

    /// Overwrites every cell from a flat slice of `C * size` floats.
    pub fn copy_from_flat(&mut self, values: &[f32]) {
        let dst = self.data.as_flattened_mut();
        assert_eq!(dst.len(), values.len(), "flat copy size mismatch");
        let precision = self.precision;
        for (out, v) in dst.iter_mut().zip(values) {
            *out = precision.store(*v);
        }
    }

    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.grid, other.grid, "grid mismatch");
        self.copy_from_flat(other.as_flat());
    }

    pub fn clear(&mut self) {
        self.data.fill([0.0; C]);
    }

    /// Evaluates `f` for every cell. Cells are independent, so large grids
    /// are split across the rayon pool.
    pub fn fill_with_index(&mut self, f: impl Fn(usize, usize) -> [f32; C] + Sync) {
        let width = self.grid.width();
        let precision = self.precision;
        if should_parallel(self.data.len()) {
            self.data.par_iter_mut().enumerate().for_each(|(i, value)| {
                *value = f(i % width, i / width).map(|v| precision.store(v));
            });
        } else {
            for (i, value) in self.data.iter_mut().enumerate() {
                *value = f(i % width, i / width).map(|v| precision.store(v));
            }
        }
    }

    /// Neighbour at `(x + dx, y + dy)`, reflected onto the edge cell when it
    /// falls outside. Returns which axes were reflected.
    pub fn neighbor(&self, x: usize, y: usize, dx: i32, dy: i32) -> ([f32; C], bool, bool) {
        let (nx, ny, rx, ry) = self.grid.reflect(x as i32 + dx, y as i32 + dy);
        (self.get(nx, ny), rx, ry)
    }

    /// Bilinear interpolation over the four nearest samples at a grid-space
    /// position. Positions outside the domain clamp to the edge samples.
    pub fn sample_bilinear(&self, pos: (f32, f32)) -> [f32; C] {
        let max_x = (self.grid.width() - 1) as f32;
        let max_y = (self.grid.height() - 1) as f32;
        let sx = (pos.0 - 0.5).clamp(0.0, max_x);
        let sy = (pos.1 - 0.5).clamp(0.0, max_y);
        let x0 = sx.floor() as usize;
        let y0 = sy.floor() as usize;
        let x1 = (x0 + 1).min(self.grid.width() - 1);
        let y1 = (y0 + 1).min(self.grid.height() - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;
        let v00 = self.get(x0, y0);
        let v10 = self.get(x1, y0);
        let v01 = self.get(x0, y1);
        let v11 = self.get(x1, y1);
        std::array::from_fn(|c| {
            let bottom = v00[c] + (v10[c] - v00[c]) * fx;
            let top = v01[c] + (v11[c] - v01[c]) * fx;
            bottom + (top - bottom) * fy
        })
    }

    pub fn abs_max(&self, channel: usize) -> f32 {
        self.data.iter().map(|v| v[channel].abs()).fold(0.0, f32::max)
    }
}

/// Two same-shaped fields and the index of the one currently readable.
#[derive(Clone, Debug)]
pub struct DoubleBuffer<const C: usize> {
    slots: [Field<C>; 2],
    read: usize,
}

impl<const C: usize> DoubleBuffer<C> {
    pub fn new(grid: Grid, precision: Precision) -> Self {
        Self {
            slots: [Field::new(grid, precision), Field::new(grid, precision)],
            read: 0,
        }
    }

    pub fn from_field(field: Field<C>) -> Self {
        let other = Field::new(field.grid(), field.precision());
        Self { slots: [field, other], read: 0 }
    }

    pub fn grid(&self) -> Grid {
        self.slots[0].grid()
    }

    pub fn read_index(&self) -> usize {
        self.read
    }

    pub fn read(&self) -> &Field<C> {
        &self.slots[self.read]
    }

    /// Read slot and write slot, borrowed disjointly.
    pub fn split(&mut self) -> (&Field<C>, &mut Field<C>) {
        let (a, b) = self.slots.split_at_mut(1);
        if self.read == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    pub fn swap(&mut self) {
        self.read ^= 1;
    }

    /// Runs one pass from the read slot into the write slot, then swaps.
    pub fn step_with<R>(&mut self, pass: impl FnOnce(&Field<C>, &mut Field<C>) -> R) -> R {
        let out = {
            let (src, dst) = self.split();
            pass(src, dst)
        };
        self.swap();
        out
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_flags_out_of_range_neighbors() {
        let grid = Grid::new(4, 3, 1.0);
        assert_eq!(grid.reflect(-1, 1), (0, 1, true, false));
        assert_eq!(grid.reflect(4, 3), (3, 2, true, true));
        assert_eq!(grid.reflect(2, 1), (2, 1, false, false));
    }

    #[test]
    fn bilinear_hits_cell_centres_exactly() {
        let grid = Grid::new(3, 2, 1.0);
        let field = Field::<1>::from_fn(grid, Precision::Float32, |x, y| [(x + 10 * y) as f32]);
        assert_eq!(field.sample_bilinear((1.5, 1.5)), [11.0]);
        assert_eq!(field.sample_bilinear((1.0, 0.5)), [0.5]);
        assert_eq!(field.sample_bilinear((2.0, 1.0)), [6.5]);
        // clamps beyond the edge
        assert_eq!(field.sample_bilinear((-4.0, 9.0)), [10.0]);
    }

    #[test]
    fn unorm8_quantizes_on_write() {
        let grid = Grid::new(2, 2, 1.0);
        let mut field = Field::<4>::new(grid, Precision::Unorm8);
        field.set(0, 0, [0.5, 2.0, -1.0, 0.1]);
        let v = field.get(0, 0);
        assert_eq!(v[0], 128.0 / 255.0);
        assert_eq!(v[1], 1.0);
        assert_eq!(v[2], 0.0);
        assert_eq!(v[3], 26.0 / 255.0);
    }

    #[test]
    fn step_with_writes_other_slot_then_swaps() {
        let grid = Grid::new(2, 2, 1.0);
        let mut buf = DoubleBuffer::<1>::new(grid, Precision::Float32);
        assert_eq!(buf.read_index(), 0);
        buf.step_with(|src, dst| {
            assert_eq!(src.get(0, 0), [0.0]);
            dst.fill_with_index(|x, y| [(x + y) as f32 + 1.0]);
        });
        assert_eq!(buf.read_index(), 1);
        assert_eq!(buf.read().get(1, 1), [3.0]);
        buf.step_with(|src, dst| dst.fill_with_index(|x, y| [src.get(x, y)[0] * 2.0]));
        assert_eq!(buf.read_index(), 0);
        assert_eq!(buf.read().get(1, 1), [6.0]);
    }
}
