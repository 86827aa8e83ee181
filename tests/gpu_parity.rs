use fluid_sidecar::gpu::GpuContext;
use fluid_sidecar::{Field, FluidEngine, PointerState, Settings, Viewport};

fn max_abs_diff<const C: usize>(a: &Field<C>, b: &Field<C>) -> f32 {
    a.as_flat()
        .iter()
        .zip(b.as_flat())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

fn max_abs<const C: usize>(a: &Field<C>) -> f32 {
    a.as_flat().iter().map(|x| x.abs()).fold(0.0, f32::max)
}

#[test]
fn gpu_matches_cpu_within_tolerance() {
    let ctx = match pollster::block_on(GpuContext::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("SKIP: {e}");
            return;
        }
    };
    let caps = ctx.capabilities();
    let settings = Settings { quality: 0, auto_quality: false, solver_iterations: Some(20), ..Settings::default() };
    let viewport = Viewport::new(256, 256);
    let mut gpu = FluidEngine::with_gpu(settings.clone(), viewport, ctx).expect("gpu passes build");
    let mut cpu = FluidEngine::new(settings, viewport, caps);

    let mut pointer = PointerState { x: -0.2, y: 0.1, prev_x: -0.2, prev_y: 0.1, down: true, moved: false };
    for frame in 0..6 {
        pointer.prev_x = pointer.x;
        pointer.prev_y = pointer.y;
        pointer.x += 0.05;
        pointer.down = frame < 4;
        gpu.step(1.0 / 60.0, &pointer);
        cpu.step(1.0 / 60.0, &pointer);
    }
    gpu.sync().expect("readback");

    let (g, c) = (gpu.state(), cpu.state());
    let v_scale = max_abs(c.velocity.read()).max(1e-3);
    let v_err = max_abs_diff(g.velocity.read(), c.velocity.read());
    assert!(v_err <= 2e-2 * v_scale, "velocity differs by {v_err} (scale {v_scale})");

    let d_err = max_abs_diff(g.dye.read(), c.dye.read());
    assert!(d_err <= 2e-2 * max_abs(c.dye.read()).max(1e-3) + 2.0 / 255.0, "dye differs by {d_err}");

    let p_err = max_abs_diff(
        gpu.particles().state().expect("particles"),
        cpu.particles().state().expect("particles"),
    );
    assert!(p_err < 1e-2, "particles differ by {p_err}");
}

#[test]
fn quality_change_reallocates_device_fields() {
    let ctx = match pollster::block_on(GpuContext::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("SKIP: {e}");
            return;
        }
    };
    let settings = Settings { quality: 0, auto_quality: false, ..Settings::default() };
    let mut gpu = FluidEngine::with_gpu(settings, Viewport::new(256, 256), ctx).expect("gpu passes build");
    let backend = gpu.backend_name();
    let before = (gpu.state().width(), gpu.state().height());

    gpu.set_quality(1);
    assert_eq!(gpu.generation(), 1);
    assert_eq!(gpu.backend_name(), backend, "rebuild fell back to the cpu");
    let after = (gpu.state().width(), gpu.state().height());
    assert_ne!(after, before);

    let stroke = PointerState { x: 0.1, y: 0.0, prev_x: -0.1, prev_y: 0.0, down: true, moved: true };
    gpu.step(1.0 / 60.0, &stroke);
    gpu.sync().expect("readback at the new size");
    assert_eq!((gpu.state().width(), gpu.state().height()), after);
    assert!(max_abs(gpu.state().velocity.read()) > 0.0);
}
