//! The host frame loop: snapshot the pointer, step, render, settle.

use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::engine::FluidEngine;
use crate::pointer::PointerTracker;

/// Frame time reported before a measured clock has a previous tick.
const FIRST_FRAME_DT: f32 = 1.0 / 60.0;

#[derive(Clone, Copy, Debug)]
pub enum FrameClock {
    Fixed(f32),
    Measured(Option<Instant>),
}

impl FrameClock {
    pub fn fixed(dt: f32) -> Self {
        FrameClock::Fixed(dt.max(0.0))
    }

    pub fn measured() -> Self {
        FrameClock::Measured(None)
    }

    /// Seconds since the previous tick.
    pub fn tick(&mut self) -> f32 {
        match self {
            FrameClock::Fixed(dt) => *dt,
            FrameClock::Measured(last) => {
                let now = Instant::now();
                let dt = last.map_or(FIRST_FRAME_DT, |prev| now.duration_since(prev).as_secs_f32());
                *last = Some(now);
                dt
            }
        }
    }
}

/// Scripted pointer input for headless runs. Coordinates are clip space.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerScript {
    #[default]
    Idle,
    /// Press at `from`, drag to `to` over `frames` frames, then release.
    Line { from: [f32; 2], to: [f32; 2], frames: u32 },
    /// Drag around a circle, `turns` times over `frames` frames.
    Circle { center: [f32; 2], radius: f32, turns: f32, frames: u32 },
}

impl PointerScript {
    fn position(&self, t: f32) -> Option<[f32; 2]> {
        match *self {
            PointerScript::Idle => None,
            PointerScript::Line { from, to, .. } => {
                Some([from[0] + (to[0] - from[0]) * t, from[1] + (to[1] - from[1]) * t])
            }
            PointerScript::Circle { center, radius, turns, .. } => {
                let a = t * turns * std::f32::consts::TAU;
                Some([center[0] + radius * a.cos(), center[1] + radius * a.sin()])
            }
        }
    }

    fn frames(&self) -> u32 {
        match *self {
            PointerScript::Idle => 0,
            PointerScript::Line { frames, .. } | PointerScript::Circle { frames, .. } => frames.max(1),
        }
    }

    /// Feeds the tracker the event for `frame`: a press on frame 0, moves
    /// on frames `1..=frames`, a release right after.
    pub fn apply(&self, frame: u32, pointer: &PointerTracker) {
        let frames = self.frames();
        if frames == 0 {
            return;
        }
        if frame == 0 {
            if let Some([x, y]) = self.position(0.0) {
                pointer.press(x, y);
            }
        } else if frame <= frames {
            if let Some([x, y]) = self.position(frame as f32 / frames as f32) {
                pointer.move_to(x, y);
            }
        } else if frame == frames + 1 {
            pointer.release();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriverReport {
    pub frames: u32,
    pub elapsed: Duration,
}

impl DriverReport {
    pub fn frames_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.frames as f64 / secs } else { 0.0 }
    }
}

pub struct FrameDriver {
    clock: FrameClock,
    pointer: PointerTracker,
    frames: u64,
}

impl FrameDriver {
    pub fn new(clock: FrameClock, pointer: PointerTracker) -> Self {
        Self { clock, pointer, frames: 0 }
    }

    /// Handle for the input side; clones share the same pointer.
    pub fn pointer(&self) -> &PointerTracker {
        &self.pointer
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// One tick. Returns the frame time handed to the engine.
    pub fn tick(&mut self, engine: &mut FluidEngine) -> f32 {
        let dt = self.clock.tick();
        let pointer = self.pointer.snapshot();
        engine.step(dt, &pointer);
        engine.render();
        self.pointer.end_frame();
        self.frames += 1;
        dt
    }

    pub fn run(&mut self, engine: &mut FluidEngine, frames: u32, script: &PointerScript) -> DriverReport {
        let start = Instant::now();
        for frame in 0..frames {
            script.apply(frame, &self.pointer);
            self.tick(engine);
        }
        engine.finish();
        DriverReport { frames, elapsed: start.elapsed() }
    }
}
