use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

use fluid_sidecar::driver::{FrameClock, FrameDriver, PointerScript};
use fluid_sidecar::gpu::GpuContext;
use fluid_sidecar::passes;
use fluid_sidecar::quality::{float_free_ceiling, MAX_LEVEL};
use fluid_sidecar::{
    Capabilities, Field, FluidEngine, Precision, PointerTracker, Settings, SettingsPatch, SimulationState, Viewport,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Probe,
    Simulate {
        #[serde(default = "default_viewport")]
        width: u32,
        #[serde(default = "default_viewport")]
        height: u32,
        #[serde(default = "default_frames")]
        frames: u32,
        /// Fixed frame time; measured wall time when absent.
        #[serde(default)]
        dt: Option<f32>,
        #[serde(default)]
        backend: Backend,
        #[serde(default)]
        settings: SettingsPatch,
        #[serde(default = "default_script")]
        script: PointerScript,
    },
    QualitySweep {
        #[serde(default = "default_viewport")]
        width: u32,
        #[serde(default = "default_viewport")]
        height: u32,
        #[serde(default = "default_frames")]
        frames: u32,
        #[serde(default)]
        backend: Backend,
    },
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Backend {
    Cpu,
    Gpu,
    #[default]
    Auto,
}

fn default_viewport() -> u32 { 256 }
fn default_frames() -> u32 { 60 }
fn default_script() -> PointerScript {
    PointerScript::Line { from: [-0.5, 0.0], to: [0.5, 0.0], frames: 20 }
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    ok: bool,
    backend: String,
    adapter: Option<String>,
    float_storage: bool,
    quality_ceiling: usize,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulateResponse {
    ok: bool,
    backend: String,
    frames: u32,
    elapsed_ms: f64,
    fps: f64,
    quality: usize,
    generation: u64,
    particle_count: usize,
    grid: [usize; 2],
    iterations: u32,
    avg_speed: f32,
    max_speed: f32,
    avg_divergence: f32,
    max_divergence: f32,
    dye_footprint: f32,
    dye_total: f32,
}

#[derive(Debug, Serialize)]
struct QualitySweepResponse {
    ok: bool,
    backend: String,
    runs: Vec<SimulateResponse>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req: Request = if input.trim().is_empty() {
        Request::Probe
    } else {
        serde_json::from_str(&input).context("invalid JSON request")?
    };

    match req {
        Request::Probe => {
            let resp = probe();
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Simulate { width, height, frames, dt, backend, settings, script } => {
            let viewport = Viewport::new(width.max(16), height.max(16));
            let mut engine = open_engine(backend, Settings::default(), viewport)?;
            engine.update_settings(&settings);
            let resp = simulate(&mut engine, frames, dt, &script)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::QualitySweep { width, height, frames, backend } => {
            let viewport = Viewport::new(width.max(16), height.max(16));
            let settings = Settings { auto_quality: false, ..Settings::default() };
            let mut engine = open_engine(backend, settings, viewport)?;
            let mut runs = Vec::new();
            for level in 0..=MAX_LEVEL {
                engine.set_quality(level as i64);
                if engine.quality() != level {
                    log::warn!("quality {level} unavailable on this adapter; sweep stops at {}", engine.quality());
                    break;
                }
                runs.push(simulate(&mut engine, frames, Some(1.0 / 60.0), &default_script())?);
            }
            let resp = QualitySweepResponse { ok: !runs.is_empty(), backend: engine.backend_name(), runs };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}

fn probe() -> ProbeResponse {
    match pollster::block_on(GpuContext::new()) {
        Ok(ctx) => {
            let caps = ctx.capabilities();
            let ceiling = if caps.float_storage { MAX_LEVEL } else { float_free_ceiling() };
            ProbeResponse {
                ok: true,
                backend: ctx.backend_name(),
                adapter: Some(ctx.adapter_name().to_string()),
                float_storage: caps.float_storage,
                quality_ceiling: ceiling,
                error: None,
            }
        }
        Err(err) => ProbeResponse {
            ok: true,
            backend: "cpu".into(),
            adapter: None,
            float_storage: Capabilities::default().float_storage,
            quality_ceiling: MAX_LEVEL,
            error: Some(err.to_string()),
        },
    }
}

fn open_engine(backend: Backend, settings: Settings, viewport: Viewport) -> Result<FluidEngine> {
    match backend {
        Backend::Cpu => Ok(FluidEngine::new(settings, viewport, Capabilities::default())),
        Backend::Gpu => {
            let ctx = pollster::block_on(GpuContext::new()).context("gpu backend requested")?;
            FluidEngine::with_gpu(settings, viewport, ctx).context("building gpu passes")
        }
        Backend::Auto => FluidEngine::auto(settings, viewport).context("building engine"),
    }
}

fn simulate(engine: &mut FluidEngine, frames: u32, dt: Option<f32>, script: &PointerScript) -> Result<SimulateResponse> {
    let clock = dt.map_or_else(FrameClock::measured, FrameClock::fixed);
    let mut driver = FrameDriver::new(clock, PointerTracker::new());
    let report = driver.run(engine, frames.max(1), script);
    engine.sync().context("reading back fields")?;

    let state = engine.state();
    let (avg_speed, max_speed) = speed_stats(state);
    let (avg_divergence, max_divergence) = divergence_stats(state);
    let (dye_footprint, dye_total) = dye_stats(state);

    Ok(SimulateResponse {
        ok: true,
        backend: engine.backend_name(),
        frames: report.frames,
        elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
        fps: report.frames_per_second(),
        quality: engine.quality(),
        generation: engine.generation(),
        particle_count: engine.particle_count(),
        grid: [state.width(), state.height()],
        iterations: engine.iterations(),
        avg_speed,
        max_speed,
        avg_divergence,
        max_divergence,
        dye_footprint,
        dye_total,
    })
}

fn speed_stats(state: &SimulationState) -> (f32, f32) {
    let cells = state.velocity.read().cells();
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for &[vx, vy] in cells {
        let s = (vx * vx + vy * vy).sqrt();
        sum += s;
        max = max.max(s);
    }
    (sum / cells.len().max(1) as f32, max)
}

/// Residual divergence of the projected velocity.
fn divergence_stats(state: &SimulationState) -> (f32, f32) {
    let mut residual = Field::<1>::new(state.grid(), Precision::Float32);
    passes::divergence(state.velocity.read(), &mut residual);
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for &[d] in residual.cells() {
        sum += d.abs();
        max = max.max(d.abs());
    }
    (sum / residual.cells().len().max(1) as f32, max)
}

/// Fraction of visibly dyed cells and the summed mean channel intensity.
fn dye_stats(state: &SimulationState) -> (f32, f32) {
    let cells = state.dye.read().cells();
    let mut total = 0.0f32;
    let mut lit = 0usize;
    for &[r, g, b, _] in cells {
        total += (r + g + b) / 3.0;
        if r.max(g).max(b) > 0.01 {
            lit += 1;
        }
    }
    (lit as f32 / cells.len().max(1) as f32, total)
}
