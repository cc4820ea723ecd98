use crate::frame::Region;
use image::{DynamicImage, GrayImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub sharpness_min: f64,
    pub brightness_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    /// Variance of the Laplacian over the region; higher is sharper.
    pub sharpness: f64,
    /// Mean luma over the region, 0..255.
    pub brightness: f64,
    pub passed: bool,
    pub is_blurry: bool,
    pub is_too_dark: bool,
    pub region_area_ratio: f64,
}

/// Scores `region` of `image` without touching the pixels.
pub fn assess(image: &DynamicImage, region: Region, thresholds: QualityThresholds) -> QualityScore {
    let region = region.clamp_to(image.width(), image.height());
    let gray = image
        .crop_imm(region.x, region.y, region.width, region.height)
        .to_luma8();

    let sharpness = laplacian_variance(&gray);
    let brightness = mean_luma(&gray);
    let is_blurry = sharpness < thresholds.sharpness_min;
    let is_too_dark = brightness < thresholds.brightness_min;

    QualityScore {
        sharpness,
        brightness,
        passed: !is_blurry && !is_too_dark,
        is_blurry,
        is_too_dark,
        region_area_ratio: region.area_ratio(image.width(), image.height()),
    }
}

pub fn mean_luma(gray: &GrayImage) -> f64 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let total: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    total as f64 / count as f64
}

/// 4-neighbour Laplacian over interior pixels.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let value =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += value;
            sum_sq += value * value;
            count += 1.0;
        }
    }
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}
