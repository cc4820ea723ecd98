use crate::device_camera::interface::DeviceCamera;
use crate::library::logger::interface::Logger;
use image::{DynamicImage, GrayImage, Luma};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeScene {
    /// High-contrast checkerboard, passes the quality gate.
    Sharp,
    /// Flat grey, no high-frequency content.
    Blurry,
    /// Checkerboard in near-black tones.
    Dark,
}

pub struct DeviceCameraFake {
    logger: Arc<dyn Logger + Send + Sync>,
    width: u32,
    height: u32,
    frame_interval: Duration,
    scene: Mutex<FakeScene>,
    fail_after: Option<u64>,
    captured: AtomicU64,
    started: AtomicBool,
}

impl DeviceCameraFake {
    pub fn new(logger: Arc<dyn Logger + Send + Sync>) -> Self {
        Self {
            logger: logger.with_namespace("camera").with_namespace("fake"),
            width: 160,
            height: 120,
            frame_interval: Duration::from_millis(33),
            scene: Mutex::new(FakeScene::Sharp),
            fail_after: None,
            captured: AtomicU64::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// The source errors on every capture after `frames` successful ones.
    pub fn with_fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn set_scene(&self, scene: FakeScene) {
        match self.scene.lock() {
            Ok(mut current) => *current = scene,
            Err(poisoned) => *poisoned.into_inner() = scene,
        }
    }

    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }

    fn scene(&self) -> FakeScene {
        match self.scene.lock() {
            Ok(scene) => *scene,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn render_scene(scene: FakeScene, width: u32, height: u32) -> DynamicImage {
    let mut rng = rand::rng();
    let (low, high) = match scene {
        FakeScene::Sharp => (40u8, 210u8),
        FakeScene::Blurry => (128, 128),
        FakeScene::Dark => (2, 24),
    };
    let image = GrayImage::from_fn(width, height, |x, y| {
        let base = if ((x / 8) + (y / 8)) % 2 == 0 { low } else { high };
        let jitter: i16 = match scene {
            FakeScene::Blurry => 0,
            _ => rng.random_range(-3..=3),
        };
        Luma([(base as i16 + jitter).clamp(0, 255) as u8])
    });
    DynamicImage::ImageLuma8(image)
}

impl DeviceCamera for DeviceCameraFake {
    fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.started.store(true, Ordering::SeqCst);
        self.logger.info("Camera started")?;
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.started.store(false, Ordering::SeqCst);
        self.logger.info("Camera stopped")?;
        Ok(())
    }

    fn capture_frame(&self) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
        if !self.started.load(Ordering::SeqCst) {
            return Err("camera not started".into());
        }
        if let Some(limit) = self.fail_after {
            if self.captured.load(Ordering::SeqCst) >= limit {
                return Err("camera disconnected".into());
            }
        }
        std::thread::sleep(self.frame_interval);
        self.captured.fetch_add(1, Ordering::SeqCst);
        Ok(render_scene(self.scene(), self.width, self.height))
    }
}
