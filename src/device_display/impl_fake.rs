use crate::device_display::interface::DeviceDisplay;
use crate::library::logger::interface::Logger;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Keeps what would be on the screen so tests can read it back.
#[derive(Clone)]
pub struct DeviceDisplayFake {
    logger: Arc<dyn Logger + Send + Sync>,
    lines: Arc<Mutex<[String; 2]>>,
    writes: Arc<Mutex<usize>>,
}

impl DeviceDisplayFake {
    pub fn new(logger: Arc<dyn Logger + Send + Sync>) -> Self {
        Self {
            logger: logger.with_namespace("display").with_namespace("fake"),
            lines: Arc::new(Mutex::new([String::new(), String::new()])),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    pub fn lines(&self) -> [String; 2] {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn writes(&self) -> usize {
        match self.writes.lock() {
            Ok(writes) => *writes,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl DeviceDisplay for DeviceDisplayFake {
    fn init(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.logger.info("init")?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut lines = self.lines.lock().map_err(|e| e.to_string())?;
        *lines = [String::new(), String::new()];
        Ok(())
    }

    fn write_line(&mut self, line: u8, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        if line >= self.num_lines() {
            return Err(format!("Invalid line number {}", line).into());
        }
        let truncated: String = text.chars().take(self.chars_per_line() as usize).collect();
        self.lines.lock().map_err(|e| e.to_string())?[line as usize] = truncated;
        *self.writes.lock().map_err(|e| e.to_string())? += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::logger::impl_fake::LoggerFake;

    #[test]
    fn test_write_line_truncates_and_rejects_bad_line() {
        let mut display = DeviceDisplayFake::new(Arc::new(LoggerFake::new()));
        display.write_line(0, "LOCKED PET 0.93 stable").unwrap();
        assert_eq!(display.lines()[0], "LOCKED PET 0.93 ");
        assert!(display.write_line(2, "nope").is_err());
        display.clear().unwrap();
        assert_eq!(display.lines()[0], "");
        assert_eq!(display.writes(), 1);
    }
}
