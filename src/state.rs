//! Owned simulation fields.

use crate::field::{Capabilities, DoubleBuffer, Field, Grid, Precision};

#[derive(Clone, Debug)]
pub struct SimulationState {
    grid: Grid,
    pub velocity: DoubleBuffer<2>,
    pub pressure: DoubleBuffer<1>,
    /// Rewritten from scratch every frame.
    pub divergence: Field<1>,
    pub dye: DoubleBuffer<4>,
}

impl SimulationState {
    /// Allocates every field for a `width x height` grid. The cell size is
    /// one over the grid height, so simulation space spans `[0, aspect] x [0, 1]`.
    pub fn new(width: usize, height: usize, caps: Capabilities) -> Self {
        let grid = Grid::new(width, height, 1.0 / height as f32);
        Self {
            grid,
            velocity: DoubleBuffer::new(grid, Precision::Float32),
            pressure: DoubleBuffer::new(grid, Precision::Float32),
            divergence: Field::new(grid, Precision::Float32),
            dye: DoubleBuffer::new(grid, caps.dye_precision()),
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn aspect(&self) -> f32 {
        self.grid.aspect()
    }

    pub fn cell_size(&self) -> f32 {
        self.grid.cell_size()
    }

    /// Zeroes velocity, pressure, divergence and dye; the shape is kept.
    pub fn clear(&mut self) {
        self.velocity.clear();
        self.pressure.clear();
        self.divergence.clear();
        self.dye.clear();
    }
}
