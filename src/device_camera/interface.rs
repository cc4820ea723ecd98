use image::DynamicImage;

/// Produces frames at its own cadence. `capture_frame` may block until the
/// next frame is ready; an error means the source is gone.
pub trait DeviceCamera {
    fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn capture_frame(&self) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>>;
}
