//! Quality presets and the frame-rate driven downgrade policy.

use crate::field::Capabilities;

pub const MAX_LEVEL: usize = 4;

pub const WINDOW_SECONDS: f32 = 0.5;
pub const LOW_STREAK_LIMIT: u32 = 5;
pub const MIN_GRID: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityPreset {
    pub particles: usize,
    /// Grid resolution as a fraction of the viewport.
    pub scale: f32,
    pub iterations: u32,
    pub requires_float_particles: bool,
}

pub const PRESETS: [QualityPreset; MAX_LEVEL + 1] = [
    QualityPreset { particles: 4_096, scale: 0.125, iterations: 8, requires_float_particles: false },
    QualityPreset { particles: 16_384, scale: 0.1875, iterations: 12, requires_float_particles: false },
    QualityPreset { particles: 32_768, scale: 0.25, iterations: 18, requires_float_particles: false },
    QualityPreset { particles: 65_536, scale: 0.35, iterations: 25, requires_float_particles: true },
    QualityPreset { particles: 131_072, scale: 0.5, iterations: 35, requires_float_particles: true },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }
}

/// Highest level whose particles do not need float storage.
pub fn float_free_ceiling() -> usize {
    PRESETS
        .iter()
        .rposition(|p| !p.requires_float_particles)
        .unwrap_or(0)
}

impl QualityPreset {
    pub fn grid_size(&self, viewport: Viewport) -> (usize, usize) {
        let side = |extent: u32| ((extent as f32 * self.scale).round() as u32).max(MIN_GRID) as usize;
        (side(viewport.width), side(viewport.height))
    }
}

#[derive(Clone, Debug)]
pub struct QualityController {
    level: usize,
    ceiling: usize,
    threshold: f32,
    window_elapsed: f32,
    window_frames: u32,
    low_streak: u32,
    last_fps: f32,
}

impl QualityController {
    pub fn new(level: u32, threshold: f32, caps: Capabilities) -> Self {
        let ceiling = if caps.float_storage { MAX_LEVEL } else { float_free_ceiling() };
        if ceiling < MAX_LEVEL {
            log::warn!("float storage unavailable; quality capped at level {ceiling}");
        }
        Self {
            level: (level as usize).min(ceiling),
            ceiling,
            threshold,
            window_elapsed: 0.0,
            window_frames: 0,
            low_streak: 0,
            last_fps: 0.0,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn preset(&self) -> &'static QualityPreset {
        &PRESETS[self.level]
    }

    pub fn fps(&self) -> f32 {
        self.last_fps
    }

    pub fn low_streak(&self) -> u32 {
        self.low_streak
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Clamps into `[0, ceiling]` and restarts measurement.
    pub fn set_level(&mut self, level: i64) -> usize {
        self.level = level.clamp(0, self.ceiling as i64) as usize;
        self.low_streak = 0;
        self.window_elapsed = 0.0;
        self.window_frames = 0;
        self.level
    }

    /// Accumulates one frame. Returns a new level when a closed window
    /// triggers a downgrade and `auto` is enabled.
    pub fn record_frame(&mut self, elapsed: f32, auto: bool) -> Option<usize> {
        self.window_elapsed += elapsed.max(0.0);
        self.window_frames += 1;
        if self.window_elapsed < WINDOW_SECONDS {
            return None;
        }
        let fps = self.window_frames as f32 / self.window_elapsed;
        self.window_elapsed = 0.0;
        self.window_frames = 0;
        self.record_window(fps, auto)
    }

    /// Evaluates one sampling window's frame rate.
    pub fn record_window(&mut self, fps: f32, auto: bool) -> Option<usize> {
        self.last_fps = fps;
        log::debug!("fps window {fps:.1} (level {}, streak {})", self.level, self.low_streak);
        if fps >= self.threshold {
            self.low_streak = 0;
            return None;
        }
        self.low_streak += 1;
        if self.low_streak < LOW_STREAK_LIMIT {
            return None;
        }
        self.low_streak = 0;
        if !auto || self.level == 0 {
            return None;
        }
        self.level -= 1;
        log::warn!("frame rate {fps:.1} below {:.1}; dropping to quality {}", self.threshold, self.level);
        Some(self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(level: u32) -> QualityController {
        QualityController::new(level, 40.0, Capabilities::default())
    }

    #[test]
    fn grid_respects_minimum() {
        let vp = Viewport::new(1920, 100);
        assert_eq!(PRESETS[0].grid_size(vp), (240, 32));
        assert_eq!(PRESETS[4].grid_size(vp), (960, 50));
    }

    #[test]
    fn five_low_windows_drop_one_level() {
        let mut q = controller(3);
        for _ in 0..4 {
            assert_eq!(q.record_window(20.0, true), None);
        }
        assert_eq!(q.record_window(20.0, true), Some(2));
        assert_eq!(q.level(), 2);
        assert_eq!(q.low_streak(), 0);
    }

    #[test]
    fn one_good_window_resets_streak() {
        let mut q = controller(3);
        for _ in 0..4 {
            q.record_window(10.0, true);
        }
        assert_eq!(q.low_streak(), 4);
        assert_eq!(q.record_window(40.0, true), None);
        assert_eq!(q.low_streak(), 0);
        for _ in 0..4 {
            assert_eq!(q.record_window(10.0, true), None);
        }
        assert_eq!(q.level(), 3);
    }

    #[test]
    fn manual_mode_never_downgrades() {
        let mut q = controller(2);
        for _ in 0..20 {
            assert_eq!(q.record_window(5.0, false), None);
        }
        assert_eq!(q.level(), 2);
        let mut q = controller(0);
        for _ in 0..10 {
            assert_eq!(q.record_window(5.0, true), None);
        }
    }

    #[test]
    fn frames_close_half_second_windows() {
        let mut q = controller(1);
        for _ in 0..7 {
            q.record_frame(0.0625, true);
        }
        assert_eq!(q.fps(), 0.0);
        q.record_frame(0.0625, true);
        assert_eq!(q.fps(), 16.0);
    }

    #[test]
    fn levels_clamp_to_capability_ceiling() {
        let mut q = controller(2);
        assert_eq!(q.set_level(9), 4);
        assert_eq!(q.set_level(-2), 0);
        let mut degraded = QualityController::new(4, 40.0, Capabilities { float_storage: false });
        assert_eq!(float_free_ceiling(), 2);
        assert_eq!(degraded.level(), 2);
        assert_eq!(degraded.set_level(4), 2);
    }
}
