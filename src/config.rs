//! Runtime settings recognised by the engine.
//!
//! Every option is clamped into range when applied; nothing here ever
//! reports an error back to the caller.

use serde::{Deserialize, Serialize};

use crate::quality::MAX_LEVEL;

pub const MAX_SOLVER_ITERATIONS: u32 = 200;
pub const COLOR_MODES: u32 = 8;

fn default_quality() -> u32 { 2 }
fn default_dye_intensity() -> f32 { 0.6 }
fn default_force_radius() -> f32 { 0.02 }
fn default_particle_speed() -> f32 { 1.0 }
fn default_dye_decay() -> f32 { 0.985 }
fn default_velocity_dissipation() -> f32 { 0.995 }
fn default_auto_quality() -> bool { true }
fn default_particle_drag() -> f32 { 0.12 }
fn default_low_fps_threshold() -> f32 { 40.0 }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// Overrides the preset's iteration count when set.
    #[serde(default)]
    pub solver_iterations: Option<u32>,
    #[serde(default = "default_dye_intensity")]
    pub dye_intensity: f32,
    #[serde(default = "default_force_radius")]
    pub force_radius: f32,
    #[serde(default)]
    pub color_mode: u32,
    #[serde(default = "default_particle_speed")]
    pub particle_speed: f32,
    #[serde(default = "default_dye_decay")]
    pub dye_decay: f32,
    #[serde(default = "default_velocity_dissipation")]
    pub velocity_dissipation: f32,
    #[serde(default = "default_auto_quality")]
    pub auto_quality: bool,
    #[serde(default = "default_particle_drag")]
    pub particle_drag: f32,
    #[serde(default = "default_low_fps_threshold")]
    pub low_fps_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            solver_iterations: None,
            dye_intensity: default_dye_intensity(),
            force_radius: default_force_radius(),
            color_mode: 0,
            particle_speed: default_particle_speed(),
            dye_decay: default_dye_decay(),
            velocity_dissipation: default_velocity_dissipation(),
            auto_quality: default_auto_quality(),
            particle_drag: default_particle_drag(),
            low_fps_threshold: default_low_fps_threshold(),
        }
    }
}

/// Partial update for [`Settings`]; absent fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub quality: Option<i64>,
    pub solver_iterations: Option<i64>,
    pub dye_intensity: Option<f32>,
    pub force_radius: Option<f32>,
    pub color_mode: Option<i64>,
    pub particle_speed: Option<f32>,
    pub dye_decay: Option<f32>,
    pub velocity_dissipation: Option<f32>,
    pub auto_quality: Option<bool>,
    pub particle_drag: Option<f32>,
    pub low_fps_threshold: Option<f32>,
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

/// Clamp into `(0, 1]`.
fn unit_open(value: f32, fallback: f32) -> f32 {
    finite_or(value, fallback).clamp(1e-3, 1.0)
}

pub fn clamp_level(level: i64) -> u32 {
    level.clamp(0, MAX_LEVEL as i64) as u32
}

impl Settings {
    /// Returns the same settings with every field forced into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.quality = self.quality.min(MAX_LEVEL as u32);
        self.solver_iterations = self
            .solver_iterations
            .map(|n| n.clamp(1, MAX_SOLVER_ITERATIONS));
        self.dye_intensity = finite_or(self.dye_intensity, default_dye_intensity()).max(0.0);
        self.force_radius = finite_or(self.force_radius, default_force_radius()).max(1e-4);
        self.color_mode = self.color_mode.min(COLOR_MODES - 1);
        self.particle_speed = finite_or(self.particle_speed, default_particle_speed()).max(0.0);
        self.dye_decay = unit_open(self.dye_decay, default_dye_decay());
        self.velocity_dissipation =
            unit_open(self.velocity_dissipation, default_velocity_dissipation());
        self.particle_drag = unit_open(self.particle_drag, default_particle_drag());
        self.low_fps_threshold =
            finite_or(self.low_fps_threshold, default_low_fps_threshold()).max(1.0);
        self
    }

    /// Applies a patch in place. Returns the requested quality level if the
    /// patch carries one, so the caller can reconstruct.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Option<u32> {
        if let Some(n) = patch.solver_iterations {
            self.solver_iterations = Some(n.clamp(1, MAX_SOLVER_ITERATIONS as i64) as u32);
        }
        if let Some(v) = patch.dye_intensity {
            self.dye_intensity = v;
        }
        if let Some(v) = patch.force_radius {
            self.force_radius = v;
        }
        if let Some(mode) = patch.color_mode {
            self.color_mode = mode.clamp(0, (COLOR_MODES - 1) as i64) as u32;
        }
        if let Some(v) = patch.particle_speed {
            self.particle_speed = v;
        }
        if let Some(v) = patch.dye_decay {
            self.dye_decay = v;
        }
        if let Some(v) = patch.velocity_dissipation {
            self.velocity_dissipation = v;
        }
        if let Some(v) = patch.auto_quality {
            self.auto_quality = v;
        }
        if let Some(v) = patch.particle_drag {
            self.particle_drag = v;
        }
        if let Some(v) = patch.low_fps_threshold {
            self.low_fps_threshold = v;
        }
        *self = self.clone().sanitized();
        patch.quality.map(clamp_level)
    }

    /// Iteration count for the pressure solve given the active preset.
    pub fn effective_iterations(&self, preset_iterations: u32) -> u32 {
        self.solver_iterations
            .unwrap_or(preset_iterations)
            .clamp(1, MAX_SOLVER_ITERATIONS)
    }
}
