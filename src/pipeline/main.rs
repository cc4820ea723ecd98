use crate::config::{Config, MissingRegion};
use crate::device_camera::interface::DeviceCamera;
use crate::device_display::interface::DeviceDisplay;
use crate::error::StabilizerError;
use crate::frame::{Frame, Region};
use crate::image_classifier::interface::ImageClassifier;
use crate::library::logger::interface::Logger;
use crate::pipeline::best_frame::{BestFrameBuffer, BufferedFrame};
use crate::pipeline::classifier_worker::{ClassifierWorker, Job, JobResult, Wait};
use crate::pipeline::frame_slot::LatestFrameSlot;
use crate::pipeline::render::{lines, Render};
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::quality_gate::{assess, QualityScore, QualityThresholds};
use crate::region_detector::interface::RegionDetector;
use crate::region_detector::smoothing::RegionSmoother;
use crate::snapshot::{ObservationKind, Snapshot};
use crate::stabilizer::{Cycle, Observation, Stabilizer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// State shared by the threads of one run.
#[derive(Clone)]
struct Shared {
    shutdown: Arc<AtomicBool>,
    slot: Arc<LatestFrameSlot>,
    stats: Arc<PipelineStats>,
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    best_frames: Arc<Mutex<BestFrameBuffer>>,
    fatal: Arc<Mutex<Option<StabilizerError>>>,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            slot: Arc::new(LatestFrameSlot::new()),
            stats: Arc::new(PipelineStats::new()),
            snapshot: Arc::new(RwLock::new(Arc::new(Snapshot::initial()))),
            best_frames: Arc::new(Mutex::new(BestFrameBuffer::new(config.best_frame_capacity))),
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.slot.wake();
    }

    fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        match self.snapshot.write() {
            Ok(mut current) => *current = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn best_frames(&self) -> MutexGuard<'_, BestFrameBuffer> {
        match self.best_frames.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fail(&self, error: StabilizerError) {
        match self.fatal.lock() {
            Ok(mut fatal) => *fatal = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
        self.signal_shutdown();
    }

    fn take_fatal(&self) -> Option<StabilizerError> {
        match self.fatal.lock() {
            Ok(mut fatal) => fatal.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Cloneable handle that asks a running pipeline to stop.
#[derive(Clone)]
pub struct StopSignal {
    shared: Shared,
}

impl StopSignal {
    pub fn stop(&self) {
        self.shared.signal_shutdown();
    }
}

/// Runs acquisition, inference and publishing on their own threads around a
/// single-slot frame buffer.
pub struct Pipeline {
    config: Config,
    logger: Arc<dyn Logger + Send + Sync>,
    device_camera: Arc<dyn DeviceCamera + Send + Sync>,
    region_detector: Arc<dyn RegionDetector + Send + Sync>,
    image_classifier: Arc<dyn ImageClassifier + Send + Sync>,
    device_display: Arc<Mutex<dyn DeviceDisplay + Send + Sync>>,
    shared: Shared,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        logger: Arc<dyn Logger + Send + Sync>,
        device_camera: Arc<dyn DeviceCamera + Send + Sync>,
        region_detector: Arc<dyn RegionDetector + Send + Sync>,
        image_classifier: Arc<dyn ImageClassifier + Send + Sync>,
        device_display: Arc<Mutex<dyn DeviceDisplay + Send + Sync>>,
    ) -> Self {
        let shared = Shared::new(&config);
        Self {
            logger: logger.with_namespace("pipeline"),
            config,
            device_camera,
            region_detector,
            image_classifier,
            device_display,
            shared,
            handles: vec![],
        }
    }

    pub fn start(&mut self) -> Result<(), StabilizerError> {
        if !self.handles.is_empty() {
            return Err(StabilizerError::AlreadyRunning);
        }
        self.config.validate()?;

        self.shared = Shared::new(&self.config);

        match self.device_display.lock() {
            Ok(mut display) => {
                if let Err(err) = display.init() {
                    let _ = self.logger.warn(&format!("Display init failed: {}", err));
                }
            }
            Err(_) => {
                let _ = self.logger.warn("Display lock poisoned");
            }
        }

        self.device_camera
            .start()
            .map_err(|err| StabilizerError::source_unavailable(err.to_string()))?;

        let _ = self.logger.info(&format!(
            "Starting: labels {:?}, window {}, every {} frames",
            self.config.labels, self.config.window_size, self.config.inference_every_nth
        ));

        let acquisition = Acquisition {
            logger: self.logger.with_namespace("acquisition"),
            device_camera: self.device_camera.clone(),
            shared: self.shared.clone(),
        };
        let inference = Inference::new(
            self.config.clone(),
            self.logger.clone(),
            self.region_detector.clone(),
            self.image_classifier.clone(),
            self.shared.clone(),
        );
        let publisher = Publisher {
            logger: self.logger.with_namespace("publisher"),
            render: Render::new(self.device_display.clone()),
            interval: self.config.publish_interval,
            shared: self.shared.clone(),
        };

        self.handles.push(std::thread::spawn(move || acquisition.run()));
        self.handles.push(std::thread::spawn(move || inference.run()));
        self.handles.push(std::thread::spawn(move || publisher.run()));
        Ok(())
    }

    /// Blocks until the pipeline stops on its own or through a [`StopSignal`].
    /// Returns the fatal error that stopped it, if any.
    pub fn wait(&mut self) -> Result<(), StabilizerError> {
        self.join_all()
    }

    pub fn shutdown(&mut self) -> Result<(), StabilizerError> {
        self.shared.signal_shutdown();
        self.join_all()
    }

    /// Stops the current run, discarding any fatal error it ended with, and
    /// starts again from an empty window and a fresh decision state.
    pub fn restart(&mut self) -> Result<(), StabilizerError> {
        if let Err(err) = self.shutdown() {
            let _ = self
                .logger
                .warn(&format!("Restarting after failure: {}", err));
        }
        self.start()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty() && !self.shared.is_shutdown()
    }

    /// Bound to the current run; take it after `start`.
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            shared: self.shared.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.current()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn best_frame(&self) -> Option<BufferedFrame> {
        self.shared.best_frames().best().cloned()
    }

    fn join_all(&mut self) -> Result<(), StabilizerError> {
        if self.handles.is_empty() {
            return Ok(());
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                let _ = self.logger.warn("Pipeline thread panicked");
            }
        }
        if let Err(err) = self.device_camera.stop() {
            let _ = self.logger.warn(&format!("Camera stop failed: {}", err));
        }
        let _ = self.logger.info("Stopped");
        match self.shared.take_fatal() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct Acquisition {
    logger: Arc<dyn Logger + Send + Sync>,
    device_camera: Arc<dyn DeviceCamera + Send + Sync>,
    shared: Shared,
}

impl Acquisition {
    fn run(self) {
        let mut sequence = 0u64;
        while !self.shared.is_shutdown() {
            match self.device_camera.capture_frame() {
                Ok(image) => {
                    sequence += 1;
                    let frame = Frame::new(sequence, image);
                    self.shared.stats.record_capture(frame.captured_at);
                    if self.shared.slot.publish(frame).is_some() {
                        PipelineStats::incr(&self.shared.stats.frames_overwritten);
                    }
                }
                Err(err) => {
                    let _ = self
                        .logger
                        .warn(&format!("Frame source failed after {} frames: {}", sequence, err));
                    self.shared
                        .fail(StabilizerError::source_unavailable(err.to_string()));
                    return;
                }
            }
        }
    }
}

struct Inference {
    config: Config,
    logger: Arc<dyn Logger + Send + Sync>,
    region_detector: Arc<dyn RegionDetector + Send + Sync>,
    worker: ClassifierWorker,
    stabilizer: Stabilizer,
    smoother: RegionSmoother,
    thresholds: QualityThresholds,
    shared: Shared,
    opportunities: u64,
    last_inference: Option<Instant>,
}

impl Inference {
    fn new(
        config: Config,
        logger: Arc<dyn Logger + Send + Sync>,
        region_detector: Arc<dyn RegionDetector + Send + Sync>,
        image_classifier: Arc<dyn ImageClassifier + Send + Sync>,
        shared: Shared,
    ) -> Self {
        let logger = logger.with_namespace("inference");
        Self {
            worker: ClassifierWorker::spawn(image_classifier, logger.clone()),
            stabilizer: Stabilizer::new(config.clone(), logger.clone()),
            smoother: RegionSmoother::new(config.region_smoothing_alpha),
            thresholds: QualityThresholds {
                sharpness_min: config.sharpness_min,
                brightness_min: config.brightness_min,
            },
            config,
            logger,
            region_detector,
            shared,
            opportunities: 0,
            last_inference: None,
        }
    }

    fn run(mut self) {
        while !self.shared.is_shutdown() {
            self.drain_late_results();

            let Some(frame) = self.shared.slot.take_timeout(self.config.slot_poll_interval) else {
                continue;
            };
            if self.throttled() {
                PipelineStats::incr(&self.shared.stats.frames_throttled);
                continue;
            }

            let Some(observation) = self.observe(&frame) else {
                continue;
            };

            // Nothing is applied once shutdown has been observed.
            if self.shared.is_shutdown() {
                break;
            }
            self.apply(frame, observation);
        }
        let _ = self.logger.info(&format!(
            "Inference stopped, {} stale results discarded",
            self.stabilizer.stale_results()
        ));
    }

    fn throttled(&mut self) -> bool {
        self.opportunities += 1;
        if self.opportunities % u64::from(self.config.inference_every_nth.max(1)) != 0 {
            return true;
        }
        if let Some(last) = self.last_inference {
            if last.elapsed() < self.config.min_inference_interval {
                return true;
            }
        }
        self.last_inference = Some(Instant::now());
        false
    }

    fn region_for(&mut self, frame: &Frame) -> Option<Region> {
        let (width, height) = (frame.width(), frame.height());
        let detected = self
            .region_detector
            .detect(&frame.image)
            .map(|region| region.clamp_to(width, height))
            .filter(|region| !region.is_empty());
        match detected {
            Some(region) => Some(
                self.smoother
                    .update(region)
                    .expand(self.config.region_expand, width, height),
            ),
            None => {
                self.smoother.reset();
                match self.config.missing_region {
                    MissingRegion::CenterCrop => Some(Region::center_crop(width, height)),
                    MissingRegion::WholeFrame => Some(frame.full_region()),
                    MissingRegion::NoCandidate => None,
                }
            }
        }
    }

    /// `None` when the frame was dropped or the wait was cancelled.
    fn observe(&mut self, frame: &Frame) -> Option<Observation> {
        let Some(region) = self.region_for(frame) else {
            return Some(Observation::NoCandidate);
        };

        let quality = assess(&frame.image, region, self.thresholds);
        if !quality.passed {
            return Some(Observation::QualityRejected(quality));
        }

        let job = Job {
            frame: frame.clone(),
            region,
        };
        if self.worker.try_submit(job).is_err() {
            PipelineStats::incr(&self.shared.stats.frames_dropped_busy);
            return None;
        }
        PipelineStats::incr(&self.shared.stats.classifier_calls);

        self.wait_for(frame.sequence, quality)
    }

    /// Waits for the result of `sequence` in short slices so shutdown is never
    /// held up by a slow classifier.
    fn wait_for(&mut self, sequence: u64, quality: QualityScore) -> Option<Observation> {
        let deadline = Instant::now() + self.config.classifier_timeout;
        loop {
            if self.shared.is_shutdown() {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                PipelineStats::incr(&self.shared.stats.classifier_timeouts);
                return Some(Observation::ClassifierFailed {
                    quality,
                    message: format!(
                        "no result within {:?}",
                        self.config.classifier_timeout
                    ),
                });
            }
            let slice = self
                .config
                .slot_poll_interval
                .max(Duration::from_millis(1))
                .min(deadline - now);
            match self.worker.recv_timeout(slice) {
                Wait::Ready(result) if result.sequence == sequence => {
                    return Some(match result.outcome {
                        Ok(output) => Observation::Classified {
                            quality,
                            output,
                            latency: result.latency,
                        },
                        Err(message) => Observation::ClassifierFailed { quality, message },
                    });
                }
                Wait::Ready(late) => self.discard_late(late),
                Wait::Pending => {}
                Wait::Gone => {
                    return Some(Observation::ClassifierFailed {
                        quality,
                        message: "classifier worker is gone".to_string(),
                    });
                }
            }
        }
    }

    fn drain_late_results(&mut self) {
        while let Some(late) = self.worker.try_recv() {
            self.discard_late(late);
        }
    }

    /// A late result belongs to a frame already resolved as a timeout, so its
    /// sequence is never ahead of the last accepted cycle.
    fn discard_late(&mut self, late: JobResult) {
        PipelineStats::incr(&self.shared.stats.stale_results);
        let _ = self.logger.info(&format!(
            "Discarded late result for frame {} after {:?}",
            late.sequence, late.latency
        ));
    }

    fn apply(&mut self, frame: Frame, observation: Observation) {
        let quality = match &observation {
            Observation::QualityRejected(quality)
            | Observation::ClassifierFailed { quality, .. }
            | Observation::Classified { quality, .. } => Some(*quality),
            Observation::NoCandidate => None,
        };
        let cycle = Cycle {
            sequence: frame.sequence,
            captured_at: frame.captured_at,
            observation,
        };

        match self.stabilizer.apply(cycle) {
            Ok(snapshot) => {
                let stats = &self.shared.stats;
                PipelineStats::incr(&stats.cycles);
                match snapshot.observation {
                    ObservationKind::QualityRejected => PipelineStats::incr(&stats.quality_rejected),
                    ObservationKind::NoCandidate => PipelineStats::incr(&stats.no_candidate),
                    ObservationKind::ClassifierFailure => {
                        PipelineStats::incr(&stats.classifier_failures)
                    }
                    ObservationKind::Admitted | ObservationKind::None => {}
                }
                if let Some(quality) = quality {
                    self.shared.best_frames().push(frame, quality, &snapshot);
                }
                self.shared.publish(snapshot);
            }
            Err(StabilizerError::StaleResult { .. }) => {
                PipelineStats::incr(&self.shared.stats.stale_results);
            }
            Err(err) if err.is_fatal() => {
                let _ = self.logger.warn(&format!("Cycle failed: {}", err));
                self.shared.fail(err);
            }
            Err(err) => {
                let _ = self.logger.warn(&format!("Cycle rejected: {}", err));
            }
        }
    }
}

struct Publisher {
    logger: Arc<dyn Logger + Send + Sync>,
    render: Render,
    interval: Duration,
    shared: Shared,
}

impl Publisher {
    fn run(self) {
        let mut shown: Option<[String; 2]> = None;
        loop {
            let stopping = self.shared.is_shutdown();
            let snapshot = self.shared.current();
            let next = lines(&snapshot);
            if shown.as_ref() != Some(&next) {
                match self.render.render(&snapshot) {
                    Ok(()) => shown = Some(next),
                    Err(err) => {
                        let _ = self.logger.warn(&format!("Render failed: {}", err));
                    }
                }
            }
            if stopping {
                return;
            }
            std::thread::sleep(self.interval);
        }
    }
}
