use crate::frame::{Frame, Region};
use crate::image_classifier::interface::{ClassifierOutput, ImageClassifier};
use crate::library::logger::interface::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Job {
    pub frame: Frame,
    pub region: Region,
}

#[derive(Debug)]
pub struct JobResult {
    pub sequence: u64,
    pub outcome: Result<ClassifierOutput, String>,
    pub latency: Duration,
}

pub enum Wait {
    Ready(JobResult),
    Pending,
    Gone,
}

/// Runs the classifier on its own thread, one job at a time. Submitting
/// while a job is in flight is refused so the caller can drop the frame.
pub struct ClassifierWorker {
    jobs: SyncSender<Job>,
    results: Receiver<JobResult>,
    busy: Arc<AtomicBool>,
}

impl ClassifierWorker {
    pub fn spawn(
        classifier: Arc<dyn ImageClassifier + Send + Sync>,
        logger: Arc<dyn Logger + Send + Sync>,
    ) -> Self {
        let (jobs, job_receiver) = sync_channel::<Job>(1);
        let (result_sender, results) = channel::<JobResult>();
        let busy = Arc::new(AtomicBool::new(false));

        let worker_busy = busy.clone();
        // Never joined: a stuck classifier call must not hold up shutdown.
        std::thread::spawn(move || {
            for job in job_receiver {
                let started = Instant::now();
                let region = job
                    .region
                    .clamp_to(job.frame.width(), job.frame.height());
                let crop = job
                    .frame
                    .image
                    .crop_imm(region.x, region.y, region.width, region.height);
                let outcome = classifier.classify(&crop).map_err(|e| e.to_string());
                let result = JobResult {
                    sequence: job.frame.sequence,
                    outcome,
                    latency: started.elapsed(),
                };
                // The result is queued before the worker reports idle, so a
                // late result is always ahead of the next job's.
                let delivered = result_sender.send(result);
                worker_busy.store(false, Ordering::SeqCst);
                if delivered.is_err() {
                    break;
                }
            }
            let _ = logger.info("Classifier worker stopped");
        });

        Self {
            jobs,
            results,
            busy,
        }
    }

    /// Hands the job to the worker, or gives it back if one is in flight.
    pub fn try_submit(&self, job: Job) -> Result<(), Job> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(job);
        }
        match self.jobs.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(job)
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Wait {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Wait::Ready(result),
            Err(RecvTimeoutError::Timeout) => Wait::Pending,
            Err(RecvTimeoutError::Disconnected) => Wait::Gone,
        }
    }

    pub fn try_recv(&self) -> Option<JobResult> {
        self.results.try_recv().ok()
    }
}
