use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{Job, JobError, JobHandle, JobScheduler, SchedulerError};
use crate::config::JobConfig;

#[derive(Debug)]
struct ScheduledJob {
    handle: JobHandle,
    job: Job,
    delay: Duration,
}

/// In-process queue backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct TokioJobQueue {
    sender: mpsc::UnboundedSender<ScheduledJob>,
}

/// Consuming end of a [`TokioJobQueue`], handed to [`JobWorker::run`].
#[derive(Debug)]
pub struct JobReceiver {
    inner: mpsc::UnboundedReceiver<ScheduledJob>,
}

impl TokioJobQueue {
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, inner) = mpsc::unbounded_channel();
        (Self { sender }, JobReceiver { inner })
    }
}

impl JobScheduler for TokioJobQueue {
    fn enqueue(&self, job: Job, delay: Duration) -> Result<JobHandle, SchedulerError> {
        let handle = JobHandle(Uuid::new_v4().to_string());
        debug!(
            job = %handle,
            kind = %job.kind(),
            profile_id = %job.profile_id(),
            delay_ms = delay.as_millis() as u64,
            "job enqueued"
        );
        self.sender
            .send(ScheduledJob {
                handle: handle.clone(),
                job,
                delay,
            })
            .map_err(|_| SchedulerError::Closed)?;
        Ok(handle)
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// Delivers queued jobs, each on its own task, redelivering failed ones with
/// exponential backoff until `max_deliveries` is reached.
pub struct JobWorker {
    handler: Arc<dyn JobHandler>,
    max_deliveries: u32,
    backoff: Duration,
}

impl fmt::Debug for JobWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobWorker")
            .field("max_deliveries", &self.max_deliveries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl JobWorker {
    pub fn new(handler: Arc<dyn JobHandler>, config: &JobConfig) -> Self {
        Self {
            handler,
            max_deliveries: config.max_deliveries.max(1),
            backoff: config.redelivery_backoff,
        }
    }

    /// Returns once every queue handle is dropped and in-flight jobs settle.
    pub async fn run(self, mut receiver: JobReceiver) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                scheduled = receiver.inner.recv() => match scheduled {
                    Some(scheduled) => {
                        in_flight.spawn(deliver(
                            Arc::clone(&self.handler),
                            scheduled,
                            self.max_deliveries,
                            self.backoff,
                        ));
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "job task panicked");
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "job task panicked");
            }
        }
        debug!("job worker stopped");
    }
}

async fn deliver(
    handler: Arc<dyn JobHandler>,
    scheduled: ScheduledJob,
    max_deliveries: u32,
    backoff: Duration,
) {
    let ScheduledJob { handle, job, delay } = scheduled;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    for attempt in 1..=max_deliveries {
        match handler.handle(&job).await {
            Ok(()) => {
                debug!(job = %handle, kind = %job.kind(), attempt, "job completed");
                return;
            }
            Err(err) if attempt < max_deliveries => {
                let wait = backoff.saturating_mul(1 << (attempt - 1).min(16));
                warn!(
                    job = %handle,
                    kind = %job.kind(),
                    attempt,
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "job failed; redelivering"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                error!(
                    job = %handle,
                    kind = %job.kind(),
                    profile_id = %job.profile_id(),
                    attempts = attempt,
                    error = %err,
                    "job abandoned"
                );
            }
        }
    }
}

/// Collects jobs instead of delivering them. Used by the offline CLI
/// commands and by tests that drive jobs by hand.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<(Job, Duration)>>,
    closed: bool,
}

impl RecordingScheduler {
    /// A scheduler that rejects every job as if its queue had shut down.
    pub fn closed() -> Self {
        Self {
            jobs: Mutex::default(),
            closed: true,
        }
    }

    pub fn jobs(&self) -> Vec<(Job, Duration)> {
        self.jobs
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<(Job, Duration)> {
        self.jobs
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl JobScheduler for RecordingScheduler {
    fn enqueue(&self, job: Job, delay: Duration) -> Result<JobHandle, SchedulerError> {
        if self.closed {
            return Err(SchedulerError::Closed);
        }
        let mut guard = self.jobs.lock().map_err(|_| SchedulerError::Closed)?;
        guard.push((job, delay));
        Ok(JobHandle(format!("recorded-{}", guard.len())))
    }
}
