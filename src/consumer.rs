//! Render-side consumer. Each render tick takes the newest frame, if any,
//! and moves its buffers into the renderer.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::command::CommandChannel;
use crate::config::{PipelineConfig, Viewpoint};
use crate::control::ViewpointThrottle;
use crate::frame::GeometryBuffers;
use crate::rate::RateTracker;
use crate::slot::ResultSlot;

/// Presentation layer fed by the consumer loop.
pub trait Renderer {
    /// Take ownership of new geometry, releasing whatever was shown before.
    fn update_geometry(&mut self, buffers: GeometryBuffers);

    /// Camera position used for the next viewpoint command.
    fn viewpoint(&self) -> Viewpoint;

    /// Draw with whatever geometry is currently held.
    fn render(&mut self) {}
}

/// A renderer shared with other tasks (e.g. HTTP handlers).
impl<R: Renderer> Renderer for Arc<Mutex<R>> {
    fn update_geometry(&mut self, buffers: GeometryBuffers) {
        self.lock().update_geometry(buffers);
    }

    fn viewpoint(&self) -> Viewpoint {
        self.lock().viewpoint()
    }

    fn render(&mut self) {
        self.lock().render();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ConsumerStats {
    pub ticks: u64,
    pub frames_applied: u64,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Time from frame completion to hand-off, for the last applied frame.
    pub last_frame_age_ms: f64,
    pub render_rate: f32,
}

pub struct ConsumerLoop<R> {
    renderer: R,
    results: Arc<ResultSlot>,
    commands: Arc<CommandChannel>,
    throttle: ViewpointThrottle,
    radius: f32,
    rate: RateTracker,
    stats: ConsumerStats,
    stopped: bool,
}

impl<R: Renderer> ConsumerLoop<R> {
    pub fn new(
        renderer: R,
        results: Arc<ResultSlot>,
        commands: Arc<CommandChannel>,
        config: &PipelineConfig,
        now: Instant,
    ) -> Self {
        Self {
            renderer,
            results,
            commands,
            throttle: ViewpointThrottle::new(config.viewpoint_throttle),
            radius: config.default_radius,
            rate: RateTracker::new(config.rate_window, now),
            stats: ConsumerStats::default(),
            stopped: false,
        }
    }

    /// One render tick. Returns true when new geometry was handed over.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.stopped {
            return false;
        }
        self.stats.ticks += 1;

        let applied = match self.results.take_if_present() {
            Some(frame) => {
                let stats = frame.stats();
                self.stats.vertex_count = stats.vertex_count;
                self.stats.triangle_count = stats.triangle_count;
                self.stats.frames_applied += 1;
                self.stats.last_frame_age_ms =
                    now.saturating_duration_since(frame.generated_at()).as_secs_f64() * 1000.0;
                trace!(vertices = stats.vertex_count, "applying new geometry");
                self.renderer.update_geometry(frame.into_buffers());
                true
            }
            None => false,
        };

        self.renderer.render();
        self.stats.render_rate = self.rate.tick(now);

        if let Some(command) = self.throttle.offer(now, self.renderer.viewpoint(), self.radius) {
            self.commands.send(command);
        }
        applied
    }

    /// Influence radius attached to forwarded viewpoints.
    pub fn set_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.radius = radius;
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }
}
