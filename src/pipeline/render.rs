use crate::decision::core::{Reason, Status};
use crate::device_display::interface::DeviceDisplay;
use crate::snapshot::{ObservationKind, Snapshot};
use std::error::Error;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Render {
    device_display: Arc<Mutex<dyn DeviceDisplay + Send + Sync>>,
}

impl Render {
    pub fn new(device_display: Arc<Mutex<dyn DeviceDisplay + Send + Sync>>) -> Self {
        Self { device_display }
    }

    pub fn render(&self, snapshot: &Snapshot) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut device_display = self
            .device_display
            .lock()
            .map_err(|e| format!("display lock poisoned: {}", e))?;

        let [first, second] = lines(snapshot);
        device_display.clear()?;
        device_display.write_line(0, &first)?;
        device_display.write_line(1, &second)?;
        Ok(())
    }
}

pub fn lines(snapshot: &Snapshot) -> [String; 2] {
    match &snapshot.status {
        Status::Locked { .. } => [
            format!(
                "LOCKED {}",
                snapshot.locked_label.as_deref().unwrap_or("?")
            ),
            format!(
                "{:.0}% stab {:.2}",
                snapshot.locked_confidence * 100.0,
                snapshot.stability
            ),
        ],
        Status::Unknown => {
            let second = match snapshot.reason {
                Reason::HighEntropy => "Labels disagree",
                _ => "No clear object",
            };
            ["UNKNOWN".to_string(), second.to_string()]
        }
        Status::Unstable => ["UNSTABLE".to_string(), "Hold steady".to_string()],
        Status::Scanning => {
            let second = match (snapshot.observation, snapshot.reason) {
                (ObservationKind::QualityRejected, _) => quality_hint(snapshot),
                (_, Reason::QualityLoss) => "Image too poor".to_string(),
                _ => match &snapshot.top_label {
                    Some(label) => {
                        format!("{}? {:.0}%", label, snapshot.top_confidence * 100.0)
                    }
                    None => "Show an object".to_string(),
                },
            };
            ["SCANNING".to_string(), second]
        }
    }
}

fn quality_hint(snapshot: &Snapshot) -> String {
    match snapshot.quality {
        Some(quality) if quality.is_too_dark => "Too dark".to_string(),
        Some(quality) if quality.is_blurry => "Too blurry".to_string(),
        _ => "Image too poor".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_display::impl_fake::DeviceDisplayFake;
    use crate::library::logger::impl_fake::LoggerFake;
    use crate::quality_gate::QualityScore;

    #[test]
    fn test_locked_lines() {
        let mut snapshot = Snapshot::initial();
        snapshot.status = Status::Locked { label: 1 };
        snapshot.locked_label = Some("PET".to_string());
        snapshot.locked_confidence = 0.934;
        snapshot.stability = 0.88;
        assert_eq!(
            lines(&snapshot),
            ["LOCKED PET".to_string(), "93% stab 0.88".to_string()]
        );
    }

    #[test]
    fn test_unknown_names_its_cause() {
        let mut snapshot = Snapshot::initial();
        snapshot.status = Status::Unknown;
        snapshot.reason = Reason::LowConfidence;
        assert_eq!(lines(&snapshot)[1], "No clear object");
        snapshot.reason = Reason::HighEntropy;
        assert_eq!(lines(&snapshot)[1], "Labels disagree");
    }

    #[test]
    fn test_scanning_shows_candidate_or_quality_hint() {
        let mut snapshot = Snapshot::initial();
        assert_eq!(lines(&snapshot)[1], "Show an object");

        snapshot.top_label = Some("PP".to_string());
        snapshot.top_confidence = 0.55;
        snapshot.observation = ObservationKind::Admitted;
        assert_eq!(lines(&snapshot)[1], "PP? 55%");

        snapshot.observation = ObservationKind::QualityRejected;
        snapshot.quality = Some(QualityScore {
            sharpness: 200.0,
            brightness: 10.0,
            passed: false,
            is_blurry: false,
            is_too_dark: true,
            region_area_ratio: 0.4,
        });
        assert_eq!(lines(&snapshot)[1], "Too dark");
    }

    #[test]
    fn test_render_writes_both_lines() {
        let display = DeviceDisplayFake::new(Arc::new(LoggerFake::new()));
        let render = Render::new(Arc::new(Mutex::new(display.clone())));
        let mut snapshot = Snapshot::initial();
        snapshot.status = Status::Unknown;
        render.render(&snapshot).unwrap();
        assert_eq!(
            display.lines(),
            ["UNKNOWN".to_string(), "No clear object".to_string()]
        );
    }
}
