use crate::frame::Region;
use image::DynamicImage;

/// Locates the object to classify. `None` means nothing was found.
pub trait RegionDetector {
    fn detect(&self, image: &DynamicImage) -> Option<Region>;
}
