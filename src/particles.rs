//! The particle swarm, stored as a square grid of packed texels.

use crate::field::{DoubleBuffer, Field, Grid, Precision};

/// Smallest side whose square holds `requested` particles.
pub fn particle_side(requested: usize) -> usize {
    if requested == 0 {
        return 0;
    }
    let mut side = (requested as f64).sqrt() as usize;
    while side * side < requested {
        side += 1;
    }
    while side > 1 && (side - 1) * (side - 1) >= requested {
        side -= 1;
    }
    side
}

#[derive(Clone, Debug)]
pub struct ParticleSystem {
    side: usize,
    /// `None` when the swarm is empty.
    state: Option<DoubleBuffer<4>>,
}

impl ParticleSystem {
    pub fn new(requested: usize) -> Self {
        let side = particle_side(requested);
        let state = (side > 0).then(|| DoubleBuffer::from_field(Self::lattice(side)));
        Self { side, state }
    }

    /// Evenly spaced seed positions with zero velocity.
    fn lattice(side: usize) -> Field<4> {
        let grid = Grid::new(side, side, 1.0);
        let step = 2.0 / side as f32;
        Field::from_fn(grid, Precision::Float32, |x, y| {
            [(x as f32 + 0.5) * step - 1.0, (y as f32 + 0.5) * step - 1.0, 0.0, 0.0]
        })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn count(&self) -> usize {
        self.side * self.side
    }

    pub fn state(&self) -> Option<&Field<4>> {
        self.state.as_ref().map(|s| s.read())
    }

    pub fn buffer_mut(&mut self) -> Option<&mut DoubleBuffer<4>> {
        self.state.as_mut()
    }

    pub fn reseed(&mut self) {
        if self.side > 0 {
            self.state = Some(DoubleBuffer::from_field(Self::lattice(self.side)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_is_smallest_covering_square() {
        assert_eq!(particle_side(0), 0);
        assert_eq!(particle_side(1), 1);
        assert_eq!(particle_side(16), 4);
        assert_eq!(particle_side(17), 5);
        assert_eq!(particle_side(32_768), 182);
        assert_eq!(particle_side(131_072), 363);
    }

    #[test]
    fn lattice_is_centred_and_still() {
        let system = ParticleSystem::new(4);
        assert_eq!(system.count(), 4);
        let state = system.state().unwrap();
        assert_eq!(state.get(0, 0), [-0.5, -0.5, 0.0, 0.0]);
        assert_eq!(state.get(1, 1), [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn reseed_restores_lattice() {
        let mut system = ParticleSystem::new(9);
        let seeded = system.state().unwrap().clone();
        system.buffer_mut().unwrap().step_with(|_, dst| dst.fill_with_index(|_, _| [0.9; 4]));
        assert_ne!(system.state().unwrap(), &seeded);
        system.reseed();
        assert_eq!(system.state().unwrap(), &seeded);
    }
}
