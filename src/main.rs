use config::Config;
use device_camera::impl_fake::DeviceCameraFake;
use device_display::impl_console::DeviceDisplayConsole;
use image_classifier::impl_fake::ImageClassifierFake;
use library::logger::impl_console::LoggerConsole;
use library::logger::interface::Logger;
use pipeline::main::Pipeline;
use region_detector::impl_fake::RegionDetectorFake;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod config;
mod decision;
mod device_camera;
mod device_display;
mod error;
mod frame;
mod image_classifier;
mod library;
mod pipeline;
mod quality_gate;
mod region_detector;
mod snapshot;
mod stabilizer;
mod temporal_aggregator;

const DEFAULT_RUN_SECS: u64 = 10;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    let run_for = match std::env::args().nth(1) {
        Some(secs) => Duration::from_secs(secs.parse()?),
        None => Duration::from_secs(DEFAULT_RUN_SECS),
    };

    let logger = Arc::new(LoggerConsole::new(config.logger_timezone));

    let device_camera = Arc::new(DeviceCameraFake::new(logger.clone()));

    let region_detector = Arc::new(RegionDetectorFake::new(None));

    let image_classifier = Arc::new(ImageClassifierFake::new(
        logger.clone(),
        config.labels.len(),
    ));
    image_classifier.set_latency(Duration::from_millis(80));
    image_classifier.set_target(config.label_index("PET").unwrap_or(0), 0.85);

    let device_display = Arc::new(Mutex::new(DeviceDisplayConsole::new()));

    let mut pipeline = Pipeline::new(
        config.clone(),
        logger.clone(),
        device_camera,
        region_detector,
        image_classifier.clone(),
        device_display,
    );

    pipeline.start()?;

    // Swap the object in view halfway through so the relock path shows up.
    let stop = pipeline.stop_signal();
    let next_label = config.label_index("PP").unwrap_or(0);
    std::thread::spawn(move || {
        std::thread::sleep(run_for / 2);
        image_classifier.set_target(next_label, 0.9);
        std::thread::sleep(run_for / 2);
        stop.stop();
    });

    pipeline.wait()?;

    let _ = logger.info(&format!("Final: {:?}", pipeline.snapshot()));
    let _ = logger.info(&format!("Stats: {:?}", pipeline.stats()));
    if let Some(best) = pipeline.best_frame() {
        let _ = logger.info(&format!(
            "Best frame: #{} locked={} label={:?} sharpness={:.1}",
            best.frame.sequence, best.locked, best.locked_label, best.quality.sharpness
        ));
    }

    Ok(())
}
