use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const FPS_SPAN: Duration = Duration::from_secs(2);

/// Counters shared by the pipeline threads.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_captured: AtomicU64,
    /// Frames replaced in the slot before inference picked them up.
    pub frames_overwritten: AtomicU64,
    pub frames_throttled: AtomicU64,
    pub frames_dropped_busy: AtomicU64,
    pub quality_rejected: AtomicU64,
    pub no_candidate: AtomicU64,
    pub classifier_calls: AtomicU64,
    pub classifier_failures: AtomicU64,
    pub classifier_timeouts: AtomicU64,
    pub stale_results: AtomicU64,
    pub cycles: AtomicU64,
    capture_times: Mutex<FpsMeter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_overwritten: u64,
    pub frames_throttled: u64,
    pub frames_dropped_busy: u64,
    pub quality_rejected: u64,
    pub no_candidate: u64,
    pub classifier_calls: u64,
    pub classifier_failures: u64,
    pub classifier_timeouts: u64,
    pub stale_results: u64,
    pub cycles: u64,
    pub capture_fps: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture(&self, now: Instant) {
        Self::incr(&self.frames_captured);
        match self.capture_times.lock() {
            Ok(mut meter) => meter.tick(now),
            Err(poisoned) => poisoned.into_inner().tick(now),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let capture_fps = match self.capture_times.lock() {
            Ok(meter) => meter.rate(Instant::now()),
            Err(poisoned) => poisoned.into_inner().rate(Instant::now()),
        };
        StatsSnapshot {
            frames_captured: load(&self.frames_captured),
            frames_overwritten: load(&self.frames_overwritten),
            frames_throttled: load(&self.frames_throttled),
            frames_dropped_busy: load(&self.frames_dropped_busy),
            quality_rejected: load(&self.quality_rejected),
            no_candidate: load(&self.no_candidate),
            classifier_calls: load(&self.classifier_calls),
            classifier_failures: load(&self.classifier_failures),
            classifier_timeouts: load(&self.classifier_timeouts),
            stale_results: load(&self.stale_results),
            cycles: load(&self.cycles),
            capture_fps,
        }
    }
}

/// Frames per second over a trailing time span.
#[derive(Debug)]
pub struct FpsMeter {
    span: Duration,
    times: VecDeque<Instant>,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(FPS_SPAN)
    }
}

impl FpsMeter {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            times: VecDeque::new(),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.times.push_back(now);
        self.evict(now);
    }

    pub fn rate(&self, now: Instant) -> f64 {
        let recent: Vec<&Instant> = self
            .times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= self.span)
            .collect();
        match (recent.first(), recent.last()) {
            (Some(first), Some(last)) if recent.len() > 1 => {
                let elapsed = last.saturating_duration_since(**first).as_secs_f64();
                if elapsed > 0.0 {
                    (recent.len() - 1) as f64 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.times.front() {
            if now.saturating_duration_since(*front) > self.span {
                self.times.pop_front();
            } else {
                break;
            }
        }
    }
}
