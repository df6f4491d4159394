//! Background threads for readiness checks, inference and filesystem actions.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::classifier::{Classifier, Verdict};

use super::actions::ActionResolver;
use super::image_path::ImagePath;
use super::readiness::{ReadinessPolicy, await_ready};
use super::record::Outcome;
use super::{ControlMessage, PipelineError};

const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 8;

/// Work handed from the control thread to a worker. Workers only get copies of paths and data.
#[derive(Debug, Clone)]
pub(crate) enum Job {
    AwaitReady(ImagePath),
    Classify { path: ImagePath, data: Arc<[u8]> },
    Resolve { path: ImagePath, verdict: Verdict },
}

impl Job {
    /// Message reported back when the job could not run to completion.
    fn abandoned(&self) -> ControlMessage {
        match self {
            Job::AwaitReady(path) => ControlMessage::NotReady(path.clone()),
            Job::Classify { path, .. } => ControlMessage::Classified {
                path: path.clone(),
                verdict: Verdict::error(false),
            },
            Job::Resolve { path, .. } => ControlMessage::Resolved {
                path: path.clone(),
                outcome: Outcome::Failed {
                    reason: "worker panicked".into(),
                },
            },
        }
    }
}

/// Where the coordinator sends work. A trait so tests can record jobs instead of running them.
pub(crate) trait JobQueue {
    fn submit(&mut self, job: Job);
}

/// Everything a worker needs, shared across the pool.
pub(crate) struct WorkerContext {
    pub(crate) readiness: ReadinessPolicy,
    pub(crate) classifier: Classifier,
    pub(crate) resolver: ActionResolver,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) results: Sender<ControlMessage>,
}

pub(crate) struct WorkerPool {
    jobs: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub(crate) fn spawn(requested: usize, context: WorkerContext) -> Result<Self, PipelineError> {
        let count = worker_count(requested);
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let shutdown = Arc::clone(&context.shutdown);
        let context = Arc::new(context);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let job_rx = Arc::clone(&job_rx);
            let context = Arc::clone(&context);
            let handle = thread::Builder::new()
                .name(format!("defectwatch-worker-{index}"))
                .spawn(move || run_worker(&job_rx, &context))
                .map_err(PipelineError::SpawnThread)?;
            threads.push(handle);
        }
        debug!(workers = count, "Worker pool started");
        Ok(Self {
            jobs: Some(job_tx),
            threads,
            shutdown,
        })
    }

    /// Abandon queued work, let running jobs finish, and join every worker.
    pub(crate) fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.jobs.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl JobQueue for WorkerPool {
    fn submit(&mut self, job: Job) {
        let Some(jobs) = self.jobs.as_ref() else {
            return;
        };
        if jobs.send(job).is_err() {
            warn!("Worker pool is gone; dropping job");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_count(requested: usize) -> usize {
    if requested >= 1 {
        return requested;
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

fn run_worker(job_rx: &Mutex<Receiver<Job>>, context: &WorkerContext) {
    loop {
        let job = {
            let Ok(receiver) = job_rx.lock() else {
                return;
            };
            match receiver.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };
        if context.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let message = catch_unwind(AssertUnwindSafe(|| run_job(&job, context))).unwrap_or_else(|_| {
            error!(job = ?job_kind(&job), "Worker job panicked");
            job.abandoned()
        });
        if context.results.send(message).is_err() {
            return;
        }
    }
}

fn run_job(job: &Job, context: &WorkerContext) -> ControlMessage {
    match job {
        Job::AwaitReady(path) => {
            match await_ready(path.as_path(), context.readiness, &context.shutdown) {
                Some(bytes) => ControlMessage::Ready {
                    path: path.clone(),
                    data: Arc::from(bytes),
                },
                None => ControlMessage::NotReady(path.clone()),
            }
        }
        Job::Classify { path, data } => ControlMessage::Classified {
            path: path.clone(),
            verdict: context.classifier.classify(data),
        },
        Job::Resolve { path, verdict } => ControlMessage::Resolved {
            path: path.clone(),
            outcome: context.resolver.resolve(path, verdict, &context.shutdown),
        },
    }
}

fn job_kind(job: &Job) -> &'static str {
    match job {
        Job::AwaitReady(_) => "await_ready",
        Job::Classify { .. } => "classify",
        Job::Resolve { .. } => "resolve",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Polarity;
    use crate::pipeline::RetryConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(results: Sender<ControlMessage>) -> WorkerContext {
        WorkerContext {
            readiness: ReadinessPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(0),
            },
            classifier: Classifier::demo(Polarity::DefectProbability),
            resolver: ActionResolver::new(RetryConfig::new(1, Duration::from_millis(0))),
            shutdown: Arc::new(AtomicBool::new(false)),
            results,
        }
    }

    #[test]
    fn worker_count_defaults_to_bounded_parallelism() {
        assert_eq!(worker_count(3), 3);
        let derived = worker_count(0);
        assert!((MIN_WORKERS..=MAX_WORKERS).contains(&derived));
    }

    #[test]
    fn readiness_job_reports_bytes_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"data").unwrap();
        let (tx, rx) = mpsc::channel();
        let mut pool = WorkerPool::spawn(2, context(tx)).unwrap();

        pool.submit(Job::AwaitReady(ImagePath::new(&path)));

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ControlMessage::Ready { path: ready, data } => {
                assert_eq!(ready, ImagePath::new(&path));
                assert_eq!(&*data, b"data");
            }
            other => panic!("unexpected message {other:?}"),
        }
        pool.shutdown();
    }

    #[test]
    fn undecodable_data_classifies_as_error() {
        let (tx, rx) = mpsc::channel();
        let mut pool = WorkerPool::spawn(1, context(tx)).unwrap();
        pool.submit(Job::Classify {
            path: ImagePath::new("x.png"),
            data: Arc::from(b"nope".to_vec()),
        });
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ControlMessage::Classified { verdict, .. } => assert!(verdict.is_error()),
            other => panic!("unexpected message {other:?}"),
        }
    }
}
