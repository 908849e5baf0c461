use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Windowed tick-rate counter. Each loop owns its own instance.
#[derive(Clone, Debug)]
pub struct RateTracker {
    window: Duration,
    count: u32,
    window_start: Instant,
    rate: f32,
}

impl RateTracker {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            count: 0,
            window_start: now,
            rate: 0.0,
        }
    }

    /// Count one tick. Returns the last computed rate (ticks per second),
    /// recomputed only once the window has elapsed.
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window && !elapsed.is_zero() {
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            self.rate = (self.count as f64 * 1000.0 / elapsed_ms) as f32;
            self.count = 0;
            self.window_start = now;
        }
        self.rate
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

/// Lock-free f32 readout so another thread can display a loop's rate.
#[derive(Debug, Default)]
pub struct SharedRate(AtomicU32);

impl SharedRate {
    pub fn store(&self, rate: f32) {
        self.0.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}
