use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

/// A captured image. The pixels are shared, never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(sequence: u64, image: DynamicImage) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn full_region(&self) -> Region {
        Region::new(0, 0, self.width(), self.height())
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (x1, x2) = (x1.min(x2).max(0.0), x1.max(x2).max(0.0));
        let (y1, y2) = (y1.min(y2).max(0.0), y1.max(y2).max(0.0));
        Self::new(
            x1 as u32,
            y1 as u32,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
        )
    }

    pub fn corners(&self) -> [f64; 4] {
        [
            self.x as f64,
            self.y as f64,
            self.x as f64 + self.width as f64,
            self.y as f64 + self.height as f64,
        ]
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grows the region about its centre and clamps it to `width` x `height`.
    pub fn expand(&self, factor: f64, width: u32, height: u32) -> Region {
        let [x1, y1, x2, y2] = self.corners();
        let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
        let (w, h) = ((x2 - x1) * factor, (y2 - y1) * factor);
        Region::from_corners(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
            .clamp_to(width, height)
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Region {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = (self.x.saturating_add(self.width)).min(width);
        let bottom = (self.y.saturating_add(self.height)).min(height);
        Region::new(x, y, right - x, bottom - y)
    }

    /// The 20%..80% box used when no object region is known.
    pub fn center_crop(width: u32, height: u32) -> Region {
        let (w, h) = (width as f64, height as f64);
        Region::from_corners(w * 0.2, h * 0.2, w * 0.8, h * 0.8)
    }

    pub fn area_ratio(&self, width: u32, height: u32) -> f64 {
        let total = width as u64 * height as u64;
        if total == 0 {
            return 0.0;
        }
        self.area() as f64 / total as f64
    }
}
