use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use terrainstream::config::Knob;
use terrainstream::{
    ControlSurface, HeightfieldConfig, HeightfieldEngine, Pipeline, PipelineConfig,
    PipelineError, PreviewRenderer, Viewpoint, logging,
};

fn main() -> Result<(), PipelineError> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();

    let seconds: f32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5.0);
    let seed: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(42);
    let render_distance: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(4);
    let out_dir: PathBuf = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));
    let radius: f32 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(30.0);

    std::fs::create_dir_all(&out_dir)?;

    info!(seconds, seed, render_distance, radius, "streaming terrain");

    let engine_config = HeightfieldConfig {
        seed,
        ..Default::default()
    };
    let mut pipeline = Pipeline::start_with(
        || HeightfieldEngine::new(engine_config),
        PipelineConfig::default(),
    )?;

    let commands = pipeline.commands();
    let mut controls = ControlSurface::new();
    controls.set_render_distance(&commands, render_distance);

    let mut consumer = pipeline.consumer(PreviewRenderer::new(Viewpoint::default()));
    consumer.set_radius(radius);

    // Render side at roughly twice the generation cadence.
    let frame = pipeline.config().tick_interval / 2;

    // Camera orbits the origin.
    let start = Instant::now();
    let run_for = Duration::from_secs_f32(seconds.max(0.1));
    let mut last_report = start;
    let mut reshaped = false;

    while start.elapsed() < run_for {
        let now = Instant::now();
        let t = (now - start).as_secs_f32();
        consumer
            .renderer_mut()
            .set_camera(Viewpoint::new(60.0 * (t * 0.4).cos(), 20.0, 60.0 * (t * 0.4).sin()));

        if !reshaped && t > seconds * 0.5 {
            controls.set(Knob::MountainScale, 50.0);
            controls.set(Knob::DesertThreshold, 60.0);
            controls.apply(&commands);
            reshaped = true;
            info!("applied custom terrain shape");
        }

        consumer.tick(now);

        if now.duration_since(last_report) >= Duration::from_secs(1) {
            let stats = consumer.stats();
            info!(
                render_fps = stats.render_rate,
                geometry_fps = pipeline.generation_rate(),
                vertices = stats.vertex_count,
                triangles = stats.triangle_count,
                frames = stats.frames_applied,
                "rates"
            );
            last_report = now;
        }

        std::thread::sleep(frame.saturating_sub(now.elapsed()));
    }

    consumer.stop();
    pipeline.stop();

    let stats = consumer.stats();
    info!(
        frames = stats.frames_applied,
        coalesced = commands.coalesced(),
        "done"
    );

    let renderer = consumer.into_renderer();
    let path = out_dir.join("preview.png");
    renderer.save_png(&path, 512)?;
    info!(path = %path.display(), "saved preview");

    Ok(())
}
