use crate::frame::Frame;
use crate::quality_gate::QualityScore;
use crate::snapshot::Snapshot;
use std::collections::VecDeque;

const SHARP_WEIGHT: f64 = 0.3;
const BRIGHT_WEIGHT: f64 = 0.2;
const CONFIDENCE_WEIGHT: f64 = 0.3;
const STABILITY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub frame: Frame,
    pub quality: QualityScore,
    pub locked: bool,
    pub locked_label: Option<String>,
    pub locked_confidence: f64,
    pub stability: f64,
}

impl BufferedFrame {
    fn score(&self) -> f64 {
        let flag = |ok: bool| if ok { 1.0 } else { 0.0 };
        SHARP_WEIGHT * flag(!self.quality.is_blurry)
            + BRIGHT_WEIGHT * flag(!self.quality.is_too_dark)
            + CONFIDENCE_WEIGHT * self.locked_confidence
            + STABILITY_WEIGHT * self.stability
    }
}

/// The last few processed frames, for picking a representative image of what
/// was recognised.
#[derive(Debug)]
pub struct BestFrameBuffer {
    capacity: usize,
    entries: VecDeque<BufferedFrame>,
}

impl BestFrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, frame: Frame, quality: QualityScore, snapshot: &Snapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BufferedFrame {
            frame,
            quality,
            locked: snapshot.is_locked(),
            locked_label: snapshot.locked_label.clone(),
            locked_confidence: snapshot.locked_confidence,
            stability: snapshot.stability,
        });
    }

    /// Highest scoring locked frame, else the newest frame that passed the
    /// quality gate, else the newest frame.
    pub fn best(&self) -> Option<&BufferedFrame> {
        let mut best: Option<(&BufferedFrame, f64)> = None;
        for entry in self.entries.iter().filter(|e| e.locked) {
            let score = entry.score();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((entry, score));
            }
        }
        if let Some((entry, _)) = best {
            return Some(entry);
        }
        self.entries
            .iter()
            .rev()
            .find(|e| e.quality.passed)
            .or_else(|| self.entries.back())
    }
}
