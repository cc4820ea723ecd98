use crate::frame::Region;
use crate::region_detector::interface::RegionDetector;
use image::DynamicImage;
use std::sync::Mutex;

/// Reports a fixed region as given, without fitting it to the image.
pub struct RegionDetectorFake {
    region: Mutex<Option<Region>>,
}

impl RegionDetectorFake {
    pub fn new(region: Option<Region>) -> Self {
        Self {
            region: Mutex::new(region),
        }
    }

    pub fn set_region(&self, region: Option<Region>) {
        match self.region.lock() {
            Ok(mut current) => *current = region,
            Err(poisoned) => *poisoned.into_inner() = region,
        }
    }
}

impl RegionDetector for RegionDetectorFake {
    fn detect(&self, _image: &DynamicImage) -> Option<Region> {
        match self.region.lock() {
            Ok(region) => *region,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
