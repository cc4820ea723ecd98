use crate::frame::Frame;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Single-slot buffer between acquisition and inference. The newest frame
/// always wins; the producer never waits on the consumer.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    slot: Mutex<Option<Frame>>,
    ready: Condvar,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame`, returning the unconsumed frame it replaced.
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        let replaced = self.guard().replace(frame);
        self.ready.notify_one();
        replaced
    }

    /// Waits up to `timeout` for a frame to appear.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let guard = self.guard();
        let mut guard = match self.ready.wait_timeout_while(guard, timeout, |slot| slot.is_none()) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
        guard.take()
    }

    /// Unblocks a waiting consumer, e.g. on shutdown.
    pub fn wake(&self) {
        self.ready.notify_all();
    }

    fn guard(&self) -> MutexGuard<'_, Option<Frame>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(sequence: u64) -> Frame {
        Frame::new(sequence, DynamicImage::new_luma8(4, 4))
    }

    #[test]
    fn test_newest_frame_wins() {
        let slot = LatestFrameSlot::new();
        assert!(slot.publish(frame(1)).is_none());
        let replaced = slot.publish(frame(2)).unwrap();
        assert_eq!(replaced.sequence, 1);
        assert_eq!(slot.take_timeout(Duration::ZERO).unwrap().sequence, 2);
        assert!(slot.take_timeout(Duration::ZERO).is_none());
    }

    #[test]
    fn test_take_timeout_returns_empty_after_timeout() {
        let slot = LatestFrameSlot::new();
        let start = Instant::now();
        assert!(slot.take_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_take_timeout_wakes_on_publish() {
        let slot = Arc::new(LatestFrameSlot::new());
        let producer = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                slot.publish(frame(7));
            })
        };
        let taken = slot.take_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(taken.map(|f| f.sequence), Some(7));
    }
}
