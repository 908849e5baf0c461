use std::sync::Arc;
use std::time::{Duration, Instant};

use terrainstream::config::{Knob, TERRAIN_KNOBS};
use terrainstream::{
    Command, CommandChannel, ConsumerLoop, ControlSurface, EngineError, GenerationLoop,
    GeometryBuffers, GeometryFrame, HeightfieldConfig, HeightfieldEngine, Pipeline,
    PipelineConfig, PreviewRenderer, Renderer, ResultSlot, TerrainEngine, TerrainShape,
    TickOutcome, Viewpoint, defaults,
};

fn buffers(vertices: usize) -> GeometryBuffers {
    GeometryBuffers {
        positions: vec![0.0; vertices * 3],
        indices: Vec::new(),
        normals: vec![0.0; vertices * 3],
        colors: None,
    }
}

/// Scripted engine: emits meshes of the listed sizes in order, records
/// everything the loop tells it.
#[derive(Default)]
struct ScriptedEngine {
    ready: bool,
    sizes: Vec<usize>,
    calls: usize,
    viewpoints: Vec<(Viewpoint, f32)>,
    shape: Option<TerrainShape>,
    render_distance: Option<u32>,
}

impl ScriptedEngine {
    fn ready(sizes: &[usize]) -> Self {
        Self {
            ready: true,
            sizes: sizes.to_vec(),
            ..Default::default()
        }
    }
}

impl TerrainEngine for ScriptedEngine {
    fn poll_ready(&mut self) -> bool {
        self.ready
    }

    fn generate(
        &mut self,
        viewpoint: Viewpoint,
        radius: f32,
    ) -> Result<Option<GeometryBuffers>, EngineError> {
        if !self.ready {
            return Err(EngineError::NotReady);
        }
        self.viewpoints.push((viewpoint, radius));
        let size = self.sizes.get(self.calls).copied().unwrap_or(3);
        self.calls += 1;
        Ok(Some(buffers(size)))
    }

    fn set_render_distance(&mut self, distance: u32) {
        self.render_distance = Some(distance);
    }

    fn set_terrain_shape(&mut self, shape: &TerrainShape) {
        self.shape = Some(*shape);
    }
}

#[derive(Default)]
struct CountingRenderer {
    camera: Viewpoint,
    held: Option<GeometryBuffers>,
    seen: Vec<usize>,
}

impl Renderer for CountingRenderer {
    fn update_geometry(&mut self, buffers: GeometryBuffers) {
        self.seen.push(buffers.vertex_count());
        self.held = Some(buffers);
    }

    fn viewpoint(&self) -> Viewpoint {
        self.camera
    }
}

struct Rig {
    commands: Arc<CommandChannel>,
    results: Arc<ResultSlot>,
    generation: GenerationLoop<ScriptedEngine>,
    t0: Instant,
}

fn rig(engine: ScriptedEngine) -> Rig {
    let commands = Arc::new(CommandChannel::new());
    let results = Arc::new(ResultSlot::new());
    let t0 = Instant::now();
    let generation = GenerationLoop::new(
        engine,
        commands.clone(),
        results.clone(),
        &PipelineConfig::default(),
        t0,
    );
    Rig {
        commands,
        results,
        generation,
        t0,
    }
}

#[test]
fn burst_of_viewpoints_reaches_engine_as_last_value() {
    let mut rig = rig(ScriptedEngine::ready(&[]));
    rig.commands.send(Command::SetViewpoint {
        viewpoint: Viewpoint::new(0.0, 0.0, 0.0),
        radius: 30.0,
    });
    rig.commands.send(Command::SetViewpoint {
        viewpoint: Viewpoint::new(10.0, 0.0, 0.0),
        radius: 30.0,
    });

    assert!(matches!(rig.generation.tick(rig.t0), TickOutcome::Published(_)));
    assert_eq!(rig.generation.params().viewpoint, Viewpoint::new(10.0, 0.0, 0.0));
    assert_eq!(
        rig.generation.engine().viewpoints,
        vec![(Viewpoint::new(10.0, 0.0, 0.0), 30.0)]
    );
    assert_eq!(rig.commands.coalesced(), 1);
}

#[test]
fn consumer_only_ever_sees_the_newest_frame() {
    let mut rig = rig(ScriptedEngine::ready(&[1000, 2000]));
    let mut consumer = ConsumerLoop::new(
        CountingRenderer::default(),
        rig.results.clone(),
        rig.commands.clone(),
        &PipelineConfig::default(),
        rig.t0,
    );

    rig.generation.tick(rig.t0);
    rig.generation.tick(rig.t0 + Duration::from_millis(33));
    assert_eq!(rig.results.published(), 2);

    assert!(consumer.tick(rig.t0 + Duration::from_millis(40)));
    assert_eq!(consumer.renderer().seen, vec![2000]);
    assert_eq!(consumer.stats().vertex_count, 2000);
    assert_eq!(rig.results.dropped(), 1);
    assert!(rig.results.take_if_present().is_none());
}

#[test]
fn frame_stats_always_match_its_buffers() {
    let mut rig = rig(ScriptedEngine::ready(&[4, 9, 16]));
    for i in 0..3 {
        match rig.generation.tick(rig.t0 + Duration::from_millis(33 * i)) {
            TickOutcome::Published(stats) => {
                let frame = rig.results.take_if_present().unwrap();
                assert_eq!(frame.stats(), stats);
                assert_eq!(stats.vertex_count, frame.buffers().positions.len() / 3);
                assert_eq!(stats.triangle_count, frame.buffers().indices.len() / 3);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}

#[test]
fn unready_engine_leaves_slot_empty() {
    let mut rig = rig(ScriptedEngine::default());
    for i in 0..5 {
        let outcome = rig.generation.tick(rig.t0 + Duration::from_millis(40 * i));
        assert_eq!(outcome, TickOutcome::NotReady);
    }
    assert!(rig.results.is_empty());
    assert_eq!(rig.generation.stats().skipped_not_ready, 5);
    assert!(rig.generation.engine().viewpoints.is_empty());
}

#[test]
fn shape_change_reaches_engine_between_generation_ticks() {
    let mut rig = rig(ScriptedEngine::ready(&[]));
    assert!(matches!(rig.generation.tick(rig.t0), TickOutcome::Published(_)));

    let shape = TerrainShape::defaults().with(Knob::MountainScale, 45.0);
    rig.commands.send(Command::SetTerrainShape { shape });

    // Well inside the generation interval: no engine call, but the shape is
    // already installed.
    let outcome = rig.generation.tick(rig.t0 + Duration::from_millis(5));
    assert_eq!(outcome, TickOutcome::Waiting);
    assert_eq!(rig.generation.engine().shape, Some(shape));
    assert_eq!(rig.generation.engine().calls, 1);
    assert_eq!(rig.generation.params().shape.mountain_scale, 45.0);
}

#[test]
fn render_distance_applies_without_waiting_for_tick() {
    let mut rig = rig(ScriptedEngine::ready(&[]));
    rig.generation.tick(rig.t0);
    rig.commands.send(Command::SetRenderDistance { distance: 7 });
    assert_eq!(rig.generation.tick(rig.t0 + Duration::from_millis(1)), TickOutcome::Waiting);
    assert_eq!(rig.generation.engine().render_distance, Some(7));
}

#[test]
fn reset_restores_every_declared_default() {
    let commands = CommandChannel::new();
    let mut controls = ControlSurface::new();
    controls.set(Knob::HillsScale, 25.0);
    controls.set(Knob::SeaLevel, -6.0);
    controls.set(Knob::CaveThreshold, 10.0);
    controls.apply(&commands);

    let shape = controls.reset(&commands);
    for d in &TERRAIN_KNOBS {
        assert_eq!(shape.get(d.knob), d.default, "{}", d.id);
    }
    assert_eq!(commands.drain().shape, Some(TerrainShape::defaults()));
}

#[test]
fn defaults_are_stable_and_in_range() {
    assert_eq!(defaults(), defaults());
    assert!(defaults().shape.in_range());
    assert_eq!(defaults().shape, TerrainShape::defaults());
}

#[test]
fn out_of_range_shape_is_clamped_before_engine_sees_it() {
    let mut rig = rig(ScriptedEngine::ready(&[]));
    let wild = TerrainShape::defaults()
        .with(Knob::MountainScale, 500.0)
        .with(Knob::BiomeScale, -3.0);
    rig.commands.send(Command::SetTerrainShape { shape: wild });
    rig.generation.tick(rig.t0);

    let applied = rig.generation.engine().shape.unwrap();
    assert!(applied.in_range());
    assert_eq!(applied.mountain_scale, 50.0);
    assert_eq!(applied.biome_scale, 50.0);
}

#[test]
fn handoff_moves_buffers_without_copying() {
    let results = Arc::new(ResultSlot::new());
    let commands = Arc::new(CommandChannel::new());
    let mut consumer = ConsumerLoop::new(
        CountingRenderer::default(),
        results.clone(),
        commands,
        &PipelineConfig::default(),
        Instant::now(),
    );

    let mesh = buffers(64);
    let positions = mesh.positions.as_ptr();
    results.publish(GeometryFrame::new(mesh, Instant::now()));
    assert!(consumer.tick(Instant::now()));

    let held = consumer.renderer().held.as_ref().unwrap();
    assert_eq!(held.positions.as_ptr(), positions);
}

#[test]
fn heightfield_pipeline_streams_into_preview() {
    let engine_config = HeightfieldConfig {
        cells_per_chunk: 4,
        ..Default::default()
    };
    let mut pipeline = Pipeline::start_with(
        || HeightfieldEngine::new(engine_config),
        PipelineConfig::default(),
    )
    .unwrap();
    let mut consumer = pipeline.consumer(PreviewRenderer::new(Viewpoint::new(0.0, 20.0, 0.0)));

    let deadline = Instant::now() + Duration::from_secs(10);
    while consumer.stats().frames_applied == 0 {
        assert!(Instant::now() < deadline, "no geometry within deadline");
        consumer.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(5));
    }

    // Default render distance 4, 4 cells per chunk: a 17 x 17 vertex grid.
    let stats = consumer.renderer().held_stats();
    assert_eq!(stats.vertex_count, 17 * 17);
    assert_eq!(stats.triangle_count, 16 * 16 * 2);
    assert!(pipeline.is_running());

    pipeline.stop();
    assert!(!pipeline.is_running());
    assert!(pipeline.results().is_empty());

    let png = consumer.renderer().encode_png(32).unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}
