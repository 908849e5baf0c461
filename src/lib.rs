pub mod command;
pub mod config;
pub mod consumer;
pub mod control;
pub mod engine;
pub mod error;
pub mod frame;
pub mod generation;
pub mod grid;
pub mod heightfield;
pub mod logging;
pub mod noise;
pub mod rate;
pub mod render;
pub mod rng;
pub mod slot;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

pub use command::{Command, CommandChannel, CommandKind, PendingCommands};
pub use config::{ParameterSet, PipelineConfig, TerrainShape, Viewpoint, defaults};
pub use consumer::{ConsumerLoop, ConsumerStats, Renderer};
pub use control::{ControlSurface, ViewpointThrottle};
pub use engine::TerrainEngine;
pub use error::{EngineError, PipelineError};
pub use frame::{GeometryBuffers, GeometryFrame, MeshStats};
pub use generation::{GenerationHandle, GenerationLoop, GenerationStats, TickOutcome};
pub use heightfield::{HeightfieldConfig, HeightfieldEngine};
pub use rate::RateTracker;
pub use render::PreviewRenderer;
pub use slot::ResultSlot;

/// A running generation loop plus the two mailboxes that connect it to the
/// control and render sides.
pub struct Pipeline {
    commands: Arc<CommandChannel>,
    results: Arc<ResultSlot>,
    generation: GenerationHandle,
    config: PipelineConfig,
}

impl Pipeline {
    /// Build the engine and start generating. Engine construction errors
    /// are returned before any thread is spawned.
    pub fn start_with<E, F>(make_engine: F, config: PipelineConfig) -> Result<Self, PipelineError>
    where
        E: TerrainEngine + 'static,
        F: FnOnce() -> Result<E, PipelineError>,
    {
        let engine = make_engine()?;
        Self::start(engine, config)
    }

    pub fn start<E: TerrainEngine + 'static>(
        engine: E,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let commands = Arc::new(CommandChannel::new());
        let results = Arc::new(ResultSlot::new());
        let generation = GenerationLoop::new(
            engine,
            commands.clone(),
            results.clone(),
            &config,
            Instant::now(),
        );
        let generation = GenerationHandle::spawn(generation, config.poll_interval)?;
        info!(
            tick_ms = config.tick_interval.as_millis() as u64,
            poll_ms = config.poll_interval.as_millis() as u64,
            "pipeline started"
        );
        Ok(Self {
            commands,
            results,
            generation,
            config,
        })
    }

    pub fn commands(&self) -> Arc<CommandChannel> {
        self.commands.clone()
    }

    pub fn results(&self) -> Arc<ResultSlot> {
        self.results.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A consumer loop wired to this pipeline's mailboxes.
    pub fn consumer<R: Renderer>(&self, renderer: R) -> ConsumerLoop<R> {
        ConsumerLoop::new(
            renderer,
            self.results.clone(),
            self.commands.clone(),
            &self.config,
            Instant::now(),
        )
    }

    pub fn generation_rate(&self) -> f32 {
        self.generation.rate()
    }

    pub fn is_running(&self) -> bool {
        self.generation.is_running()
    }

    /// Halt generation, release the engine and drop any unconsumed frame.
    pub fn stop(&mut self) {
        self.generation.stop();
        self.results.clear();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
