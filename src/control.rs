//! Control-side state: live knob values and the viewpoint throttle.

use std::time::{Duration, Instant};

use crate::command::{Command, CommandChannel};
use crate::config::{
    DEFAULT_RENDER_DISTANCE, Knob, KnobDescriptor, TERRAIN_KNOBS, TerrainShape, Viewpoint,
};

/// Live slider values. Every write is snapped to the knob's range and step,
/// and nothing reaches the generator until `apply` or `reset`.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSurface {
    shape: TerrainShape,
    render_distance: u32,
}

impl ControlSurface {
    pub fn new() -> Self {
        Self {
            shape: TerrainShape::defaults(),
            render_distance: DEFAULT_RENDER_DISTANCE,
        }
    }

    pub fn descriptors(&self) -> &'static [KnobDescriptor] {
        &TERRAIN_KNOBS
    }

    /// Set one knob; returns the value actually stored.
    pub fn set(&mut self, knob: Knob, value: f32) -> f32 {
        let snapped = knob.descriptor().snap(value);
        self.shape = self.shape.with(knob, snapped);
        snapped
    }

    /// Set a knob by control id or field name. `None` for unknown names.
    pub fn set_named(&mut self, name: &str, value: f32) -> Option<f32> {
        Knob::from_name(name).map(|knob| self.set(knob, value))
    }

    pub fn value(&self, knob: Knob) -> f32 {
        self.shape.get(knob)
    }

    pub fn shape(&self) -> TerrainShape {
        self.shape
    }

    pub fn render_distance(&self) -> u32 {
        self.render_distance
    }

    /// Send the current knob values to the generator.
    pub fn apply(&self, channel: &CommandChannel) -> TerrainShape {
        channel.send(Command::SetTerrainShape { shape: self.shape });
        self.shape
    }

    /// Restore every knob to its table default and send the result.
    pub fn reset(&mut self, channel: &CommandChannel) -> TerrainShape {
        self.shape = TerrainShape::defaults();
        self.apply(channel)
    }

    pub fn set_render_distance(&mut self, channel: &CommandChannel, distance: u32) -> u32 {
        self.render_distance = distance.max(1);
        channel.send(Command::SetRenderDistance { distance: self.render_distance });
        self.render_distance
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate-limits viewpoint commands from the render side. Repeats of the last
/// accepted viewpoint are never resent.
#[derive(Clone, Debug)]
pub struct ViewpointThrottle {
    min_interval: Duration,
    last_sent: Option<(Instant, Viewpoint, f32)>,
}

impl ViewpointThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    pub fn offer(&mut self, now: Instant, viewpoint: Viewpoint, radius: f32) -> Option<Command> {
        if let Some((at, last_vp, last_radius)) = self.last_sent {
            if last_vp == viewpoint && last_radius == radius {
                return None;
            }
            if now.saturating_duration_since(at) < self.min_interval {
                return None;
            }
        }
        self.last_sent = Some((now, viewpoint, radius));
        Some(Command::SetViewpoint { viewpoint, radius })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_table_defaults_after_edits() {
        let channel = CommandChannel::new();
        let mut controls = ControlSurface::new();
        controls.set(Knob::MountainScale, 45.0);
        controls.set(Knob::Roughness, 9.0);
        controls.set(Knob::DesertThreshold, 80.0);
        assert_ne!(controls.shape(), TerrainShape::defaults());

        let sent = controls.reset(&channel);
        for d in &TERRAIN_KNOBS {
            assert_eq!(controls.value(d.knob), d.default);
        }
        assert_eq!(channel.drain().shape, Some(sent));
    }

    #[test]
    fn control_values_stay_in_range() {
        let mut controls = ControlSurface::new();
        for d in controls.descriptors() {
            controls.set(d.knob, d.max + 1000.0);
            assert!(d.contains(controls.value(d.knob)));
            controls.set(d.knob, d.min - 1000.0);
            assert!(d.contains(controls.value(d.knob)));
        }
        assert!(controls.shape().in_range());
    }

    #[test]
    fn set_named_accepts_ids_and_fields() {
        let mut controls = ControlSurface::new();
        assert_eq!(controls.set_named("tree-density", 7.4), Some(7.0));
        assert_eq!(controls.set_named("biomeScale", 260.0), Some(250.0));
        assert_eq!(controls.set_named("gravity", 1.0), None);
    }

    #[test]
    fn render_distance_is_at_least_one() {
        let channel = CommandChannel::new();
        let mut controls = ControlSurface::new();
        assert_eq!(controls.set_render_distance(&channel, 0), 1);
        assert_eq!(channel.drain().render_distance, Some(1));
    }

    #[test]
    fn throttle_limits_viewpoint_rate() {
        let t0 = Instant::now();
        let mut throttle = ViewpointThrottle::new(Duration::from_millis(100));
        let vp = |x| Viewpoint::new(x, 0.0, 0.0);

        assert!(throttle.offer(t0, vp(0.0), 30.0).is_some());
        assert!(throttle.offer(t0 + Duration::from_millis(50), vp(1.0), 30.0).is_none());
        assert_eq!(
            throttle.offer(t0 + Duration::from_millis(100), vp(2.0), 30.0),
            Some(Command::SetViewpoint { viewpoint: vp(2.0), radius: 30.0 })
        );
        // Unchanged viewpoint is not resent however long we wait.
        assert!(throttle.offer(t0 + Duration::from_secs(5), vp(2.0), 30.0).is_none());
    }
}
