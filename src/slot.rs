use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::frame::GeometryFrame;

/// Latest-wins mailbox between the generation loop and the consumer.
/// Holds at most one frame; publishing drops whatever was not yet taken.
#[derive(Debug, Default)]
pub struct ResultSlot {
    frame: Mutex<Option<GeometryFrame>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: GeometryFrame) {
        let stale = self.frame.lock().replace(frame);
        self.published.fetch_add(1, Ordering::Relaxed);
        // Drop outside the lock so freeing big buffers never delays a taker.
        if let Some(stale) = stale {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(vertices = stale.stats().vertex_count, "dropped unconsumed frame");
        }
    }

    /// Remove and return the held frame, if any.
    pub fn take_if_present(&self) -> Option<GeometryFrame> {
        self.frame.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.lock().is_none()
    }

    /// Release any held frame.
    pub fn clear(&self) {
        let held = self.frame.lock().take();
        drop(held);
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before a consumer took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::frame::GeometryBuffers;

    fn frame_with_vertices(n: usize) -> GeometryFrame {
        GeometryFrame::new(
            GeometryBuffers {
                positions: vec![0.0; n * 3],
                indices: Vec::new(),
                normals: vec![0.0; n * 3],
                colors: None,
            },
            Instant::now(),
        )
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let slot = ResultSlot::new();
        assert!(slot.take_if_present().is_none());
        assert!(slot.is_empty());
    }

    #[test]
    fn latest_publish_wins() {
        let slot = ResultSlot::new();
        for n in 1..=5 {
            slot.publish(frame_with_vertices(n * 10));
        }
        let frame = slot.take_if_present().unwrap();
        assert_eq!(frame.stats().vertex_count, 50);
        assert!(slot.take_if_present().is_none());
        assert_eq!(slot.published(), 5);
        assert_eq!(slot.dropped(), 4);
    }

    #[test]
    fn clear_releases_held_frame() {
        let slot = ResultSlot::new();
        slot.publish(frame_with_vertices(3));
        slot.clear();
        assert!(slot.is_empty());
    }

    #[test]
    fn concurrent_publish_and_take_never_observes_older_frame_after_newer() {
        let slot = std::sync::Arc::new(ResultSlot::new());
        let producer = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                for n in 1..=2000 {
                    slot.publish(frame_with_vertices(n));
                }
            })
        };

        let mut last_seen = 0;
        while !producer.is_finished() {
            if let Some(frame) = slot.take_if_present() {
                let n = frame.stats().vertex_count;
                assert!(n > last_seen);
                last_seen = n;
            }
        }
        producer.join().unwrap();
        if let Some(frame) = slot.take_if_present() {
            assert!(frame.stats().vertex_count > last_seen);
        }
    }
}
