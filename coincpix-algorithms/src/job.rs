//! Background processing jobs.
//!
//! Coincidence building and file chopping run on a worker thread that sends
//! a single message back over a channel. The caller polls on a fixed
//! interval. Jobs cannot be cancelled and have no timeout.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use coincpix_core::{CoincidenceEvents, DetectorToolkit, Error, ProcessRequest, Result};

/// Polling interval used by front ends.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Message sent from the worker when it finishes.
enum JobMessage<T> {
    Complete(T, Duration),
    Failed(Error),
}

/// State reported by [`ProcessingJob::poll`].
#[derive(Debug)]
pub enum JobStatus<T> {
    /// Worker still running.
    Running,
    /// Worker finished with a result and its run time.
    Complete(T, Duration),
    /// Worker failed, or its result was already taken.
    Failed(Error),
}

/// Handle to a task running on a worker thread.
#[derive(Debug)]
pub struct ProcessingJob<T = CoincidenceEvents> {
    rx: Receiver<JobMessage<T>>,
    handle: Option<JoinHandle<()>>,
    started: Instant,
    finished: bool,
}

impl<T> std::fmt::Debug for JobMessage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobMessage::Complete(_, elapsed) => write!(f, "Complete({elapsed:?})"),
            JobMessage::Failed(e) => write!(f, "Failed({e})"),
        }
    }
}

impl ProcessingJob<CoincidenceEvents> {
    /// Builds coincidences on a worker thread.
    pub fn spawn(toolkit: Arc<dyn DetectorToolkit>, request: ProcessRequest) -> Self {
        log::info!("processing {} in background", request.raw_path.display());
        Self::spawn_task(move || toolkit.process_coincidences(&request))
    }
}

impl ProcessingJob<()> {
    /// Splits an oversized capture on a worker thread.
    pub fn spawn_chop(toolkit: Arc<dyn DetectorToolkit>, path: PathBuf, chunk_size_mb: usize) -> Self {
        log::info!(
            "chopping {} into {chunk_size_mb} MB chunks",
            path.display()
        );
        Self::spawn_task(move || toolkit.chop_large_file(&path, chunk_size_mb))
    }
}

impl<T: Send + 'static> ProcessingJob<T> {
    /// Runs `task` on a worker thread.
    pub fn spawn_task<F>(task: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            let msg = match task() {
                Ok(value) => JobMessage::Complete(value, started.elapsed()),
                Err(e) => JobMessage::Failed(e),
            };
            let _ = tx.send(msg);
        });
        Self {
            rx,
            handle: Some(handle),
            started,
            finished: false,
        }
    }

    /// Checks for a result without blocking.
    ///
    /// A result is handed out once; later polls report a failure.
    pub fn poll(&mut self) -> JobStatus<T> {
        if self.finished {
            return JobStatus::Failed(Error::Toolkit("job result already taken".into()));
        }
        let status = match self.rx.try_recv() {
            Ok(JobMessage::Complete(value, elapsed)) => JobStatus::Complete(value, elapsed),
            Ok(JobMessage::Failed(e)) => JobStatus::Failed(e),
            Err(TryRecvError::Empty) => return JobStatus::Running,
            Err(TryRecvError::Disconnected) => {
                JobStatus::Failed(Error::Toolkit("worker exited without a result".into()))
            }
        };
        self.finished = true;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("background worker panicked");
            }
        }
        status
    }

    /// True while the worker thread runs.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Time since the job was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Polls every `interval` until the job ends, calling `on_tick` with the
    /// elapsed time while it runs.
    ///
    /// # Errors
    /// Returns the worker's error.
    pub fn wait<F>(mut self, interval: Duration, mut on_tick: F) -> Result<(T, Duration)>
    where
        F: FnMut(Duration),
    {
        loop {
            match self.poll() {
                JobStatus::Running => {
                    on_tick(self.elapsed());
                    thread::sleep(interval);
                }
                JobStatus::Complete(value, elapsed) => {
                    log::info!("background job finished in {elapsed:.2?}");
                    return Ok((value, elapsed));
                }
                JobStatus::Failed(e) => return Err(e),
            }
        }
    }
}
