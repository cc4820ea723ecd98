use crate::device_display::interface::DeviceDisplay;
use std::error::Error;

pub struct DeviceDisplayConsole {
    display_buffer: [[char; 16]; 2],
}

impl DeviceDisplayConsole {
    pub fn new() -> Self {
        Self {
            display_buffer: [[' '; 16]; 2],
        }
    }

    fn render_display(&self) {
        println!("┌────────────────┐");
        for row in &self.display_buffer {
            let line: String = row.iter().collect();
            println!("│{}│", line);
        }
        println!("└────────────────┘");
    }
}

impl Default for DeviceDisplayConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDisplay for DeviceDisplayConsole {
    fn init(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.render_display();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.display_buffer = [[' '; 16]; 2];
        Ok(())
    }

    fn write_line(&mut self, line: u8, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        if line >= self.num_lines() {
            return Err("Invalid line number".into());
        }

        self.display_buffer[line as usize] = [' '; 16];
        for (i, c) in text.chars().take(16).enumerate() {
            self.display_buffer[line as usize][i] = c;
        }

        // Both lines are written on every render; redraw once the last lands.
        if line + 1 == self.num_lines() {
            self.render_display();
        }
        Ok(())
    }
}
