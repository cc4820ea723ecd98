use crate::image_classifier::interface::{ClassifierOutput, ImageClassifier};
use crate::library::logger::interface::Logger;
use image::DynamicImage;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Output(ClassifierOutput),
    Fail(String),
}

/// Stands in for the neural network. Scripted outcomes are served first;
/// once the script is empty it answers around the current target label.
pub struct ImageClassifierFake {
    logger: Arc<dyn Logger + Send + Sync>,
    label_count: usize,
    latency: Mutex<Duration>,
    target: Mutex<(usize, f32)>,
    jitter: f32,
    script: Mutex<VecDeque<FakeOutcome>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ImageClassifierFake {
    pub fn new(logger: Arc<dyn Logger + Send + Sync>, label_count: usize) -> Self {
        Self {
            logger: logger.with_namespace("classifier").with_namespace("fake"),
            label_count,
            latency: Mutex::new(Duration::ZERO),
            target: Mutex::new((0, 0.9)),
            jitter: 0.05,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn set_target(&self, label: usize, confidence: f32) {
        *lock(&self.target) = (label, confidence);
    }

    pub fn push_script(&self, outcomes: impl IntoIterator<Item = FakeOutcome>) {
        lock(&self.script).extend(outcomes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn target_output(&self) -> ClassifierOutput {
        let (label, confidence) = *lock(&self.target);
        let mut rng = rand::rng();
        let jitter = if self.jitter > 0.0 {
            rng.random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        ClassifierOutput::Probabilities(distribution(
            self.label_count,
            label,
            (confidence + jitter).clamp(0.0, 1.0),
        ))
    }
}

/// `confidence` on `label`, the rest spread evenly over the other labels.
pub fn distribution(label_count: usize, label: usize, confidence: f32) -> Vec<f32> {
    let rest = if label_count > 1 {
        (1.0 - confidence) / (label_count - 1) as f32
    } else {
        0.0
    };
    (0..label_count)
        .map(|i| if i == label { confidence } else { rest })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ImageClassifier for ImageClassifierFake {
    fn classify(
        &self,
        _image: &DynamicImage,
    ) -> Result<ClassifierOutput, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let scripted = lock(&self.script).pop_front();
        let result = match scripted {
            Some(FakeOutcome::Output(output)) => Ok(output),
            Some(FakeOutcome::Fail(message)) => {
                let _ = self.logger.warn(&format!("Scripted failure: {}", message));
                Err(message.into())
            }
            None => Ok(self.target_output()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
