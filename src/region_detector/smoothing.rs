use crate::frame::Region;

/// Exponential smoothing of region corners so the crop does not jitter
/// between detector outputs.
#[derive(Debug, Clone)]
pub struct RegionSmoother {
    alpha: f64,
    corners: Option<[f64; 4]>,
}

impl RegionSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            corners: None,
        }
    }

    pub fn update(&mut self, region: Region) -> Region {
        let next = region.corners();
        let smoothed = match self.corners {
            None => next,
            Some(previous) => {
                let mut out = [0.0; 4];
                for (i, value) in out.iter_mut().enumerate() {
                    *value = self.alpha * next[i] + (1.0 - self.alpha) * previous[i];
                }
                out
            }
        };
        self.corners = Some(smoothed);
        Region::from_corners(smoothed[0], smoothed[1], smoothed[2], smoothed[3])
    }

    pub fn reset(&mut self) {
        self.corners = None;
    }
}
