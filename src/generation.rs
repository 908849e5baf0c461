//! Background generation loop.
//!
//! The loop is the sole owner of the engine and of the current
//! `ParameterSet`. Each poll it drains the command channel and forwards shape
//! and render-distance changes to the engine at once; the engine itself is
//! invoked at most once per `tick_interval`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandChannel};
use crate::config::{ParameterSet, PipelineConfig};
use crate::engine::TerrainEngine;
use crate::error::{EngineError, PipelineError};
use crate::frame::{GeometryFrame, MeshStats};
use crate::rate::{RateTracker, SharedRate};
use crate::slot::ResultSlot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GenerationStats {
    pub ticks: u64,
    pub generations: u64,
    pub frames_published: u64,
    pub unchanged: u64,
    pub skipped_not_ready: u64,
    pub engine_failures: u64,
    pub last_generation_ms: f64,
    pub rate: f32,
}

/// What one call to `GenerationLoop::tick` did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The generation interval has not elapsed yet.
    Waiting,
    /// Engine still initializing; nothing generated.
    NotReady,
    Published(MeshStats),
    /// Engine decided nothing visible changed.
    Unchanged,
    Failed(EngineError),
    Stopped,
}

pub struct GenerationLoop<E> {
    engine: E,
    params: ParameterSet,
    commands: Arc<CommandChannel>,
    results: Arc<ResultSlot>,
    tick_interval: Duration,
    last_generation: Option<Instant>,
    ready: bool,
    rate: RateTracker,
    shared_rate: Arc<SharedRate>,
    stats: GenerationStats,
    // Setter calls that panicked; retried on the next poll.
    distance_stale: bool,
    shape_stale: bool,
    stopped: bool,
}

impl<E: TerrainEngine> GenerationLoop<E> {
    /// The engine receives the default render distance and shape on the
    /// first poll.
    pub fn new(
        engine: E,
        commands: Arc<CommandChannel>,
        results: Arc<ResultSlot>,
        config: &PipelineConfig,
        now: Instant,
    ) -> Self {
        let defaults = ParameterSet::defaults();
        let params = defaults.with_viewpoint(defaults.viewpoint, config.default_radius);
        Self {
            engine,
            params,
            commands,
            results,
            tick_interval: config.tick_interval,
            last_generation: None,
            ready: false,
            rate: RateTracker::new(config.rate_window, now),
            shared_rate: Arc::new(SharedRate::default()),
            stats: GenerationStats::default(),
            distance_stale: true,
            shape_stale: true,
            stopped: false,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn stats(&self) -> GenerationStats {
        self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Rate readout that stays valid after the loop moves to its thread.
    pub fn rate_handle(&self) -> Arc<SharedRate> {
        self.shared_rate.clone()
    }

    /// Drain the channel and fold every pending command into the current
    /// parameters. Returns how many commands were applied.
    pub fn apply_pending(&mut self) -> usize {
        let pending = self.commands.drain();
        let applied = pending.len();
        for command in pending {
            self.apply(command);
        }
        self.sync_engine();
        applied
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetViewpoint { viewpoint, radius } => {
                self.params = self.params.with_viewpoint(viewpoint, radius);
            }
            Command::SetRenderDistance { distance } => {
                self.params = self.params.with_render_distance(distance);
                self.distance_stale = true;
            }
            Command::SetTerrainShape { shape } => {
                self.params = self.params.with_shape(shape);
                self.shape_stale = true;
            }
        }
    }

    /// Push stale parameters into the engine. A setter that panics keeps its
    /// parameter stale so the next poll tries again.
    fn sync_engine(&mut self) {
        if self.distance_stale {
            let distance = self.params.render_distance;
            match guarded(&mut self.engine, |e| e.set_render_distance(distance)) {
                Ok(()) => {
                    self.distance_stale = false;
                    debug!(distance, "render distance applied");
                }
                Err(err) => self.record_failure(&err, "render distance setter"),
            }
        }
        if self.shape_stale {
            let shape = self.params.shape;
            match guarded(&mut self.engine, |e| e.set_terrain_shape(&shape)) {
                Ok(()) => {
                    self.shape_stale = false;
                    debug!(?shape, "terrain shape applied");
                }
                Err(err) => self.record_failure(&err, "terrain shape setter"),
            }
        }
    }

    fn record_failure(&mut self, err: &EngineError, during: &str) {
        self.stats.engine_failures += 1;
        warn!(error = %err, during, "engine call abandoned");
    }

    /// One poll: absorb commands, then run the engine if the generation
    /// interval has elapsed since the last invocation.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.stopped {
            return TickOutcome::Stopped;
        }
        self.stats.ticks += 1;
        self.apply_pending();

        let due = self
            .last_generation
            .is_none_or(|last| now.saturating_duration_since(last) >= self.tick_interval);
        if !due {
            return TickOutcome::Waiting;
        }

        if !self.ready {
            match guarded(&mut self.engine, |e| e.poll_ready()) {
                Ok(ready) => self.ready = ready,
                Err(err) => {
                    // Gate the retry like a failed generation.
                    self.last_generation = Some(now);
                    self.record_failure(&err, "readiness poll");
                    return TickOutcome::Failed(err);
                }
            }
            if !self.ready {
                self.stats.skipped_not_ready += 1;
                debug!("terrain engine not ready, skipping generation");
                return TickOutcome::NotReady;
            }
            info!("terrain engine ready, generation started");
        }

        self.last_generation = Some(now);
        self.stats.generations += 1;
        self.stats.rate = self.rate.tick(now);
        self.shared_rate.store(self.stats.rate);

        let started = Instant::now();
        let viewpoint = self.params.viewpoint;
        let radius = self.params.radius;
        let result = guarded(&mut self.engine, |e| e.generate(viewpoint, radius))
            .and_then(|generated| generated)
            .and_then(|generated| match generated {
                Some(buffers) if !buffers.is_consistent() => {
                    Err(EngineError::failure("engine produced inconsistent buffers"))
                }
                other => Ok(other),
            });

        match result {
            Ok(Some(buffers)) => {
                let frame = GeometryFrame::new(buffers, Instant::now());
                let stats = frame.stats();
                self.stats.last_generation_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.stats.frames_published += 1;
                self.results.publish(frame);
                TickOutcome::Published(stats)
            }
            Ok(None) => {
                self.stats.unchanged += 1;
                TickOutcome::Unchanged
            }
            Err(EngineError::NotReady) => {
                self.ready = false;
                debug!("terrain engine withdrew readiness, polling again");
                self.stats.skipped_not_ready += 1;
                TickOutcome::NotReady
            }
            Err(err) => {
                self.record_failure(&err, "generate");
                TickOutcome::Failed(err)
            }
        }
    }

    /// Make the loop inert; later ticks do nothing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Run one engine call, turning a panic into `EngineError::Panicked`.
fn guarded<E, T>(engine: &mut E, call: impl FnOnce(&mut E) -> T) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(|| call(engine)))
        .map_err(|payload| EngineError::Panicked(panic_message(payload)))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A generation loop running on its own thread.
pub struct GenerationHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    rate: Arc<SharedRate>,
}

impl GenerationHandle {
    /// Move `generation` onto a named thread that polls every `poll_interval`.
    pub fn spawn<E: TerrainEngine + 'static>(
        mut generation: GenerationLoop<E>,
        poll_interval: Duration,
    ) -> Result<Self, PipelineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let rate = generation.rate_handle();
        let thread_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name("terrain-generation".into())
            .spawn(move || {
                info!(poll_ms = poll_interval.as_millis() as u64, "generation loop started");
                while !thread_stop.load(Ordering::Acquire) {
                    generation.tick(Instant::now());
                    std::thread::park_timeout(poll_interval);
                }
                generation.stop();
                let stats = generation.stats();
                info!(
                    frames = stats.frames_published,
                    failures = stats.engine_failures,
                    "generation loop stopped"
                );
                // Dropping the loop releases the engine.
            })
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            stop,
            thread: Some(thread),
            rate,
        })
    }

    /// Latest generation rate (invocations per second).
    pub fn rate(&self) -> f32 {
        self.rate.load()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it to release the engine.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!("generation thread panicked");
            }
        }
    }
}

impl Drop for GenerationHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Knob, TerrainShape, Viewpoint};
    use crate::frame::GeometryBuffers;

    #[derive(Default)]
    struct Flaky {
        calls: u32,
    }

    impl TerrainEngine for Flaky {
        fn generate(
            &mut self,
            _viewpoint: Viewpoint,
            _radius: f32,
        ) -> Result<Option<GeometryBuffers>, EngineError> {
            self.calls += 1;
            match self.calls {
                1 => Err(EngineError::failure("boom")),
                2 => panic!("engine exploded"),
                _ => Ok(Some(GeometryBuffers {
                    positions: vec![0.0; 9],
                    indices: vec![0, 1, 2],
                    normals: vec![0.0; 9],
                    colors: None,
                })),
            }
        }

        fn set_render_distance(&mut self, _distance: u32) {}

        fn set_terrain_shape(&mut self, _shape: &TerrainShape) {}
    }

    /// Engine with scripted misbehavior around the generate call.
    #[derive(Default)]
    struct Touchy {
        polls: u32,
        ready_after: u32,
        shape_calls: u32,
        panic_on_shape_call: u32,
        bad_indices: bool,
        shape: Option<TerrainShape>,
    }

    impl TerrainEngine for Touchy {
        fn poll_ready(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.ready_after
        }

        fn generate(
            &mut self,
            _viewpoint: Viewpoint,
            _radius: f32,
        ) -> Result<Option<GeometryBuffers>, EngineError> {
            let indices = if self.bad_indices { vec![0, 1, 7] } else { vec![0, 1, 2] };
            Ok(Some(GeometryBuffers {
                positions: vec![0.0; 9],
                indices,
                normals: vec![0.0; 9],
                colors: None,
            }))
        }

        fn set_render_distance(&mut self, _distance: u32) {}

        fn set_terrain_shape(&mut self, shape: &TerrainShape) {
            self.shape_calls += 1;
            if self.shape_calls == self.panic_on_shape_call {
                panic!("shape rejected");
            }
            self.shape = Some(*shape);
        }
    }

    fn looped<E: TerrainEngine>(engine: E, t0: Instant) -> GenerationLoop<E> {
        GenerationLoop::new(
            engine,
            Arc::new(CommandChannel::new()),
            Arc::new(ResultSlot::new()),
            &PipelineConfig::default(),
            t0,
        )
    }

    #[test]
    fn failures_and_panics_only_cost_one_tick() {
        let t0 = Instant::now();
        let mut generation = looped(Flaky::default(), t0);
        let step = Duration::from_millis(40);

        assert!(matches!(generation.tick(t0), TickOutcome::Failed(EngineError::Failure(_))));
        assert!(matches!(
            generation.tick(t0 + step),
            TickOutcome::Failed(EngineError::Panicked(msg)) if msg == "engine exploded"
        ));
        assert_eq!(
            generation.tick(t0 + step * 2),
            TickOutcome::Published(MeshStats { vertex_count: 3, triangle_count: 1 })
        );
        assert_eq!(generation.stats().engine_failures, 2);
        assert!(generation.results.take_if_present().is_some());
    }

    #[test]
    fn engine_is_gated_by_tick_interval() {
        let t0 = Instant::now();
        let mut generation = looped(Flaky { calls: 2 }, t0);
        assert!(matches!(generation.tick(t0), TickOutcome::Published(_)));
        assert_eq!(generation.tick(t0 + Duration::from_millis(16)), TickOutcome::Waiting);
        assert!(matches!(
            generation.tick(t0 + Duration::from_millis(33)),
            TickOutcome::Published(_)
        ));
        assert_eq!(generation.engine().calls, 4);
    }

    #[test]
    fn stopped_loop_is_inert() {
        let t0 = Instant::now();
        let mut generation = looped(Flaky { calls: 2 }, t0);
        generation.stop();
        assert!(generation.is_stopped());
        assert_eq!(generation.tick(t0), TickOutcome::Stopped);
        assert_eq!(generation.engine().calls, 2);
        assert!(generation.results.is_empty());
    }

    #[test]
    fn render_distance_command_is_sanitized() {
        let t0 = Instant::now();
        let mut generation = looped(Flaky::default(), t0);
        generation.commands.send(Command::SetRenderDistance { distance: 0 });
        assert_eq!(generation.apply_pending(), 1);
        assert_eq!(generation.params().render_distance, 1);
    }

    #[test]
    fn spawned_loop_stops_and_joins() {
        let generation = looped(Flaky { calls: 2 }, Instant::now());
        let results = generation.results.clone();
        let mut handle = GenerationHandle::spawn(generation, Duration::from_millis(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while results.published() == 0 {
            assert!(Instant::now() < deadline, "no frame published");
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn panicking_setter_is_retried_on_next_poll() {
        let t0 = Instant::now();
        let mut generation = looped(Touchy { panic_on_shape_call: 2, ..Default::default() }, t0);
        assert!(matches!(generation.tick(t0), TickOutcome::Published(_)));
        assert_eq!(generation.engine().shape, Some(TerrainShape::defaults()));

        let shape = TerrainShape::defaults().with(Knob::MountainScale, 45.0);
        generation.commands.send(Command::SetTerrainShape { shape });
        assert_eq!(generation.tick(t0 + Duration::from_millis(5)), TickOutcome::Waiting);
        assert_eq!(generation.params().shape, shape);
        assert_eq!(generation.engine().shape, Some(TerrainShape::defaults()));
        assert_eq!(generation.stats().engine_failures, 1);

        generation.tick(t0 + Duration::from_millis(10));
        assert_eq!(generation.engine().shape, Some(shape));
        assert_eq!(generation.engine().shape_calls, 3);
    }

    #[test]
    fn spawned_loop_survives_setter_panic() {
        let generation =
            looped(Touchy { panic_on_shape_call: 2, ..Default::default() }, Instant::now());
        let commands = generation.commands.clone();
        let results = generation.results.clone();
        let mut handle = GenerationHandle::spawn(generation, Duration::from_millis(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while results.published() == 0 {
            assert!(Instant::now() < deadline, "no frame published");
            std::thread::sleep(Duration::from_millis(1));
        }
        commands.send(Command::SetTerrainShape {
            shape: TerrainShape::defaults().with(Knob::Roughness, 8.0),
        });

        let before = results.published();
        while results.published() < before + 2 {
            assert!(Instant::now() < deadline, "generation stalled after setter panic");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_running());
        handle.stop();
    }

    #[test]
    fn inconsistent_buffers_fail_the_tick() {
        let t0 = Instant::now();
        let mut generation = looped(Touchy { bad_indices: true, ..Default::default() }, t0);
        assert!(matches!(generation.tick(t0), TickOutcome::Failed(EngineError::Failure(_))));
        assert!(generation.results.is_empty());
        assert_eq!(generation.stats().engine_failures, 1);
        assert_eq!(generation.stats().frames_published, 0);
    }

    #[test]
    fn generation_starts_on_first_poll_after_readiness() {
        let t0 = Instant::now();
        let mut generation = looped(Touchy { ready_after: 3, ..Default::default() }, t0);
        for ms in 0..3 {
            assert_eq!(generation.tick(t0 + Duration::from_millis(ms)), TickOutcome::NotReady);
        }
        assert!(generation.results.is_empty());
        assert!(matches!(
            generation.tick(t0 + Duration::from_millis(3)),
            TickOutcome::Published(_)
        ));
        assert_eq!(generation.stats().skipped_not_ready, 3);
        assert_eq!(generation.results.published(), 1);
    }
}
