use std::error::Error;

/// A small character display, two lines of sixteen columns.
pub trait DeviceDisplay: Send + Sync {
    fn init(&mut self) -> Result<(), Box<dyn Error + Send + Sync>>;

    fn clear(&mut self) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Writes `text` to `line` (0-based), truncated to the line width.
    /// Errors if the line does not exist.
    fn write_line(&mut self, line: u8, text: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    fn num_lines(&self) -> u8 {
        2
    }

    fn chars_per_line(&self) -> u8 {
        16
    }
}
