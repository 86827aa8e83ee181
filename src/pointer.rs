//! Pointer contract between the input collaborator and the core.

use glam::Vec2;
use std::sync::{Arc, Mutex, TryLockError};

use crate::field::Grid;

const MIN_DT: f32 = 1e-4;

/// Pointer position in clip space ([-1, 1] on both axes).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerState {
    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    pub down: bool,
    pub moved: bool,
}

impl PointerState {
    pub fn current(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn previous(&self) -> Vec2 {
        Vec2::new(self.prev_x, self.prev_y)
    }

    /// Clip-space velocity over the last frame.
    pub fn velocity(&self, dt: f32) -> Vec2 {
        -(self.previous() - self.current()) / dt.max(MIN_DT)
    }
}

/// Shared pointer written by device events and snapshotted by the core.
#[derive(Clone, Debug, Default)]
pub struct PointerTracker {
    shared: Arc<Mutex<PointerState>>,
    last: PointerState,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut PointerState)) {
        // A poisoned lock still holds a usable pointer.
        let mut state = match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *state);
    }

    pub fn press(&self, x: f32, y: f32) {
        let (x, y) = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
        self.update(|p| {
            p.x = x;
            p.y = y;
            p.prev_x = x;
            p.prev_y = y;
            p.down = true;
            p.moved = false;
        });
    }

    pub fn move_to(&self, x: f32, y: f32) {
        self.update(|p| {
            p.x = x.clamp(-1.0, 1.0);
            p.y = y.clamp(-1.0, 1.0);
            p.moved = true;
        });
    }

    pub fn release(&self) {
        self.update(|p| p.down = false);
    }

    /// Settles the stroke after a frame has consumed it.
    pub fn end_frame(&self) {
        self.update(|p| {
            p.prev_x = p.x;
            p.prev_y = p.y;
            p.moved = false;
        });
    }

    /// Never blocks: if an event handler holds the lock, the previous
    /// snapshot is reused.
    pub fn snapshot(&mut self) -> PointerState {
        match self.shared.try_lock() {
            Ok(state) => self.last = *state,
            Err(TryLockError::Poisoned(poisoned)) => self.last = *poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {}
        }
        self.last
    }
}

/// One frame of pointer motion, resolved against a grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    /// Current pointer position in simulation space.
    pub head: Vec2,
    /// Previous pointer position in simulation space.
    pub tail: Vec2,
    /// Pointer velocity in clip units per second.
    pub clip_velocity: Vec2,
    /// Pointer velocity in grid cells per second.
    pub cell_velocity: Vec2,
}

impl Stroke {
    /// `None` while the pointer is up.
    pub fn from_pointer(pointer: &PointerState, grid: Grid, dt: f32) -> Option<Self> {
        if !pointer.down {
            return None;
        }
        let to_sim = |clip: Vec2| {
            let (gx, gy) = grid.clip_to_grid((clip.x, clip.y));
            Vec2::new(gx, gy) * grid.cell_size()
        };
        let clip_velocity = pointer.velocity(dt);
        let cell_velocity = clip_velocity
            * Vec2::new(grid.width() as f32 * 0.5, grid.height() as f32 * 0.5);
        Some(Self {
            head: to_sim(pointer.current()),
            tail: to_sim(pointer.previous()),
            clip_velocity,
            cell_velocity,
        })
    }

    pub fn speed(&self) -> f32 {
        self.clip_velocity.length()
    }

    /// Distance from `pos` to the segment and the clamped projection
    /// fraction along it (0 at the head, 1 at the tail).
    pub fn measure(&self, pos: Vec2) -> (f32, f32) {
        let ab = self.tail - self.head;
        let len2 = ab.length_squared();
        let fp = if len2 > 1e-12 {
            ((pos - self.head).dot(ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (pos.distance(self.head + ab * fp), fp)
    }

    pub fn tapering(fp: f32) -> f32 {
        1.0 - fp.clamp(0.0, 1.0) * 0.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_clamps_into_clip_space() {
        let mut tracker = PointerTracker::new();
        tracker.press(1.7, -3.0);
        let p = tracker.snapshot();
        assert_eq!((p.x, p.y), (1.0, -1.0));
        assert_eq!((p.prev_x, p.prev_y), (1.0, -1.0));
    }

    #[test]
    fn snapshot_reads_through_a_poisoned_lock() {
        let mut tracker = PointerTracker::new();
        let writer = tracker.clone();
        let crashed = std::thread::spawn(move || writer.update(|_| panic!("handler crashed"))).join();
        assert!(crashed.is_err());
        assert!(tracker.shared.is_poisoned());

        tracker.press(0.3, 0.4);
        let p = tracker.snapshot();
        assert_eq!((p.x, p.y), (0.3, 0.4));
        assert!(p.down);
    }

    #[test]
    fn velocity_is_derived_from_positions() {
        let p = PointerState { x: 0.2, y: 0.0, prev_x: 0.1, prev_y: 0.1, down: true, moved: true };
        let v = p.velocity(0.1);
        assert!((v.x - 1.0).abs() < 1e-5);
        assert!((v.y + 1.0).abs() < 1e-5);
        // dt floor keeps velocity finite
        assert!(p.velocity(0.0).is_finite());
    }

    #[test]
    fn tracker_settles_after_frame() {
        let mut input = PointerTracker::new();
        input.press(0.0, 0.0);
        input.move_to(0.5, 2.0);
        let snap = input.snapshot();
        assert!(snap.down && snap.moved);
        assert_eq!((snap.x, snap.y), (0.5, 1.0));
        assert_eq!((snap.prev_x, snap.prev_y), (0.0, 0.0));
        input.end_frame();
        let snap = input.snapshot();
        assert!(!snap.moved);
        assert_eq!((snap.prev_x, snap.prev_y), (0.5, 1.0));
        input.release();
        assert!(!input.snapshot().down);
    }

    #[test]
    fn measure_projects_onto_segment() {
        let stroke = Stroke {
            head: Vec2::new(0.0, 0.0),
            tail: Vec2::new(1.0, 0.0),
            clip_velocity: Vec2::ZERO,
            cell_velocity: Vec2::ZERO,
        };
        let (d, fp) = stroke.measure(Vec2::new(0.5, 0.25));
        assert!((d - 0.25).abs() < 1e-6);
        assert!((fp - 0.5).abs() < 1e-6);
        // beyond the tail measures to the endpoint
        let (d, fp) = stroke.measure(Vec2::new(2.0, 0.0));
        assert!((d - 1.0).abs() < 1e-6);
        assert_eq!(fp, 1.0);
        assert!((Stroke::tapering(fp) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn stroke_maps_clip_to_simulation_space() {
        let grid = Grid::new(64, 32, 1.0 / 32.0);
        let pointer = PointerState { x: 0.0, y: 0.0, prev_x: 0.0, prev_y: 0.5, down: true, moved: true };
        let stroke = Stroke::from_pointer(&pointer, grid, 0.02).unwrap();
        assert!((stroke.head - Vec2::new(1.0, 0.5)).length() < 1e-6);
        assert!((stroke.tail - Vec2::new(1.0, 0.75)).length() < 1e-6);
        assert!((stroke.clip_velocity.y + 25.0).abs() < 1e-3);
        assert!((stroke.cell_velocity.y + 400.0).abs() < 1e-2);
        let released = PointerState { down: false, ..pointer };
        assert!(Stroke::from_pointer(&released, grid, 0.02).is_none());
    }
}
