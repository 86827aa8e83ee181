//! Frame orchestration: owns the fields, runs the passes in order, and
//! rebuilds everything when the quality level changes.

use crate::config::{Settings, SettingsPatch};
use crate::error::{Result, SimError};
use crate::field::Capabilities;
use crate::gpu::{GpuContext, GpuSolver};
use crate::particles::ParticleSystem;
use crate::passes::{self, DyeParams, FrameInputs, ParticleParams, FLOW_SCALE};
use crate::pointer::{PointerState, Stroke};
use crate::quality::{QualityController, Viewport};
use crate::render::{composite, Frame};
use crate::state::SimulationState;

/// Longest step the solver takes, whatever the measured frame time.
pub const MAX_DT: f32 = 0.02;

enum Executor {
    Cpu,
    Gpu(Box<GpuSolver>),
}

pub struct FluidEngine {
    settings: Settings,
    viewport: Viewport,
    caps: Capabilities,
    quality: QualityController,
    state: SimulationState,
    particles: ParticleSystem,
    frame: Frame,
    executor: Executor,
    generation: u64,
    /// Host fields lag the device after a GPU step.
    host_stale: bool,
}

impl FluidEngine {
    /// Runs every pass on the CPU.
    pub fn new(settings: Settings, viewport: Viewport, caps: Capabilities) -> Self {
        let engine = Self::build(settings, viewport, caps);
        engine.log_build("cpu");
        engine
    }

    fn build(settings: Settings, viewport: Viewport, caps: Capabilities) -> Self {
        let settings = settings.sanitized();
        let quality = QualityController::new(settings.quality, settings.low_fps_threshold, caps);
        let (state, particles) = build_fields(&quality, viewport, caps);
        let mut engine = Self {
            settings,
            viewport,
            caps,
            quality,
            state,
            particles,
            frame: Frame::new(viewport),
            executor: Executor::Cpu,
            generation: 0,
            host_stale: false,
        };
        engine.settings.quality = engine.quality.level() as u32;
        engine
    }

    /// Runs every pass on the given device. Fails when a pass program does
    /// not build.
    pub fn with_gpu(settings: Settings, viewport: Viewport, ctx: GpuContext) -> Result<Self> {
        let mut engine = Self::build(settings, viewport, ctx.capabilities());
        let backend = ctx.backend_name();
        let solver = GpuSolver::new(ctx, &engine.state, &engine.particles)?;
        engine.executor = Executor::Gpu(Box::new(solver));
        engine.log_build(&backend);
        Ok(engine)
    }

    /// Prefers the GPU and falls back to the CPU when no usable adapter is
    /// found. A pass that fails to build is still an error.
    pub fn auto(settings: Settings, viewport: Viewport) -> Result<Self> {
        match pollster::block_on(GpuContext::new()) {
            Ok(ctx) => Self::with_gpu(settings, viewport, ctx),
            Err(err @ (SimError::NoAdapter(_) | SimError::Device(_) | SimError::Capability(_))) => {
                log::warn!("{err}; running on the cpu");
                Ok(Self::new(settings, viewport, Capabilities::default()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn backend_name(&self) -> String {
        match &self.executor {
            Executor::Cpu => "cpu".to_string(),
            Executor::Gpu(solver) => solver.context().backend_name(),
        }
    }

    /// Advances one frame. `dt` is the measured frame time; it feeds the
    /// quality controller as-is and is clamped to [`MAX_DT`] for the solver.
    pub fn step(&mut self, dt: f32, pointer: &PointerState) {
        let sim_dt = dt.clamp(0.0, MAX_DT);
        let inputs = self.frame_inputs(sim_dt, pointer);
        match &mut self.executor {
            Executor::Cpu => passes::run_frame(&mut self.state, &mut self.particles, &inputs),
            Executor::Gpu(solver) => {
                solver.step(&inputs);
                self.host_stale = true;
            }
        }

        if let Some(level) = self.quality.record_frame(dt, self.settings.auto_quality) {
            self.settings.quality = level as u32;
            self.reconstruct();
        }
    }

    fn frame_inputs(&self, dt: f32, pointer: &PointerState) -> FrameInputs {
        let s = &self.settings;
        FrameInputs {
            dt,
            stroke: Stroke::from_pointer(pointer, self.state.grid(), dt),
            iterations: self.iterations(),
            velocity_dissipation: s.velocity_dissipation,
            force_radius: s.force_radius,
            dye: DyeParams { decay: s.dye_decay, intensity: s.dye_intensity, color_mode: s.color_mode },
            particles: ParticleParams {
                dt,
                drag: s.particle_drag,
                speed: s.particle_speed,
                flow_scale: FLOW_SCALE,
                aspect: self.state.aspect(),
            },
        }
    }

    /// Pulls device fields back to the host when they are newer.
    pub fn sync(&mut self) -> Result<()> {
        if let Executor::Gpu(solver) = &self.executor {
            if self.host_stale {
                solver.download(&mut self.state, &mut self.particles)?;
                self.host_stale = false;
            }
        }
        Ok(())
    }

    /// Composites the current fields. A failed readback keeps the last frame.
    pub fn render(&mut self) -> &Frame {
        if let Err(err) = self.sync() {
            log::warn!("{err}; showing previous frame");
            return &self.frame;
        }
        composite(&self.state, &self.particles, &mut self.frame);
        &self.frame
    }

    /// Switches quality immediately, rebuilding every field.
    pub fn set_quality(&mut self, level: i64) {
        let level = self.quality.set_level(level);
        self.settings.quality = level as u32;
        self.reconstruct();
    }

    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        let requested = self.settings.apply(patch);
        self.quality.set_threshold(self.settings.low_fps_threshold);
        if let Some(level) = requested {
            self.set_quality(level as i64);
        }
    }

    /// Zeroes the fields and reseeds particles without changing quality.
    pub fn reset(&mut self) {
        self.state.clear();
        self.particles.reseed();
        if let Executor::Gpu(solver) = &mut self.executor {
            solver.reset(&self.particles);
        }
        self.host_stale = false;
        log::info!("simulation reset");
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.frame = Frame::new(viewport);
        self.reconstruct();
    }

    /// Replaces every field for the current level and viewport. The old
    /// fields are dropped only after the new ones exist.
    fn reconstruct(&mut self) {
        let (state, particles) = build_fields(&self.quality, self.viewport, self.caps);
        if let Executor::Gpu(solver) = &mut self.executor {
            if let Err(err) = solver.rebuild(&state, &particles) {
                log::error!("gpu rebuild failed, continuing on the cpu: {err}");
                self.executor = Executor::Cpu;
            }
        }
        self.state = state;
        self.particles = particles;
        self.host_stale = false;
        self.generation += 1;
        self.log_build(&self.backend_name());
    }

    fn log_build(&self, backend: &str) {
        log::info!(
            "built quality {} on {backend}: grid {}x{}, {} particles, {} iterations (generation {})",
            self.quality.level(),
            self.state.width(),
            self.state.height(),
            self.particles.count(),
            self.iterations(),
            self.generation,
        );
    }

    pub fn fps(&self) -> f32 {
        self.quality.fps()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.count()
    }

    pub fn quality(&self) -> usize {
        self.quality.level()
    }

    pub fn quality_ceiling(&self) -> usize {
        self.quality.ceiling()
    }

    pub fn iterations(&self) -> u32 {
        self.settings.effective_iterations(self.quality.preset().iterations)
    }

    /// Bumped on every reconstruction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Host copy of the fields; call [`FluidEngine::sync`] first on the GPU.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    /// Waits for submitted device work. A no-op on the CPU.
    pub fn finish(&self) {
        if let Executor::Gpu(solver) = &self.executor {
            solver.wait();
        }
    }
}

fn build_fields(quality: &QualityController, viewport: Viewport, caps: Capabilities) -> (SimulationState, ParticleSystem) {
    let preset = quality.preset();
    let (width, height) = preset.grid_size(viewport);
    (SimulationState::new(width, height, caps), ParticleSystem::new(preset.particles))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(level: u32) -> FluidEngine {
        let settings = Settings { quality: level, ..Settings::default() };
        FluidEngine::new(settings, Viewport::new(128, 96), Capabilities::default())
    }

    fn dragging() -> PointerState {
        PointerState { x: 0.1, y: 0.0, prev_x: -0.1, prev_y: 0.0, down: true, moved: true }
    }

    #[test]
    fn builds_from_preset() {
        let e = engine(1);
        assert_eq!(e.quality(), 1);
        assert_eq!(e.particle_count(), 128 * 128);
        assert_eq!((e.state().width(), e.state().height()), (32, 32));
        assert_eq!(e.iterations(), 12);
        assert_eq!(e.generation(), 0);
    }

    #[test]
    fn set_quality_rebuilds_immediately() {
        let mut e = engine(0);
        e.set_quality(4);
        assert_eq!(e.quality(), 4);
        assert_eq!(e.generation(), 1);
        assert_eq!((e.state().width(), e.state().height()), (64, 48));
        e.set_quality(99);
        assert_eq!(e.quality(), 4);
        assert_eq!(e.settings().quality, 4);
    }

    #[test]
    fn degraded_caps_cap_quality() {
        let settings = Settings { quality: 4, ..Settings::default() };
        let e = FluidEngine::new(settings, Viewport::new(64, 64), Capabilities { float_storage: false });
        assert_eq!(e.quality(), 2);
        assert_eq!(e.settings().quality, 2);
    }

    #[test]
    fn settings_patch_applies_and_rebuilds_on_quality() {
        let mut e = engine(2);
        e.update_settings(&SettingsPatch { dye_decay: Some(0.9), ..Default::default() });
        assert_eq!(e.generation(), 0);
        assert_eq!(e.settings().dye_decay, 0.9);
        e.update_settings(&SettingsPatch { quality: Some(1), ..Default::default() });
        assert_eq!(e.generation(), 1);
        assert_eq!(e.quality(), 1);
    }

    #[test]
    fn solver_override_wins_over_preset() {
        let mut e = engine(2);
        e.update_settings(&SettingsPatch { solver_iterations: Some(3), ..Default::default() });
        assert_eq!(e.iterations(), 3);
    }

    #[test]
    fn long_frames_are_clamped_for_the_solver() {
        let mut slow = engine(0);
        let mut capped = engine(0);
        slow.step(1.0, &dragging());
        capped.step(MAX_DT, &dragging());
        assert_eq!(slow.state().velocity.read(), capped.state().velocity.read());
        assert_eq!(slow.state().dye.read(), capped.state().dye.read());
        assert_eq!(slow.particles().state(), capped.particles().state());
        // the raw frame time still closes a 1 fps window
        assert_eq!(slow.fps(), 1.0);
        assert_eq!(capped.fps(), 0.0);
    }

    #[test]
    fn step_moves_fluid_and_reset_clears_it() {
        let mut e = engine(0);
        let lattice = engine(0).particles().state().cloned();
        for _ in 0..5 {
            e.step(0.016, &dragging());
        }
        assert!(e.state().velocity.read().abs_max(0) > 0.0);
        assert!(e.state().pressure.read().abs_max(0) > 0.0);
        assert_ne!(e.particles().state().cloned(), lattice);
        let grid = (e.state().width(), e.state().height());

        e.reset();
        assert_eq!(e.state().velocity.read().abs_max(0), 0.0);
        assert_eq!(e.state().velocity.read().abs_max(1), 0.0);
        assert_eq!(e.state().pressure.read().abs_max(0), 0.0);
        assert_eq!(e.state().divergence.abs_max(0), 0.0);
        for channel in 0..4 {
            assert_eq!(e.state().dye.read().abs_max(channel), 0.0);
        }
        assert_eq!(e.particles().state().cloned(), lattice);
        assert_eq!((e.state().width(), e.state().height()), grid);
        assert_eq!(e.generation(), 0);
    }

    #[test]
    fn resize_rebuilds_only_on_change() {
        let mut e = engine(0);
        e.resize(Viewport::new(128, 96));
        assert_eq!(e.generation(), 0);
        e.resize(Viewport::new(512, 256));
        assert_eq!(e.generation(), 1);
        assert_eq!((e.state().width(), e.state().height()), (64, 32));
        assert_eq!(e.render().width(), 512);
    }
}
