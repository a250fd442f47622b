// ============================================================================
// JOB CLIENT: submit once, then poll with a bounded budget
// ============================================================================
//
// State machine:  submitted → running → { succeeded | failed }
//                                     ↘ timed-out (budget exhausted)
//
// A failed status request is transient: it is logged and spends one attempt,
// but never turns the job into `failed`. Only the service can do that.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::job::{Job, JobKind, JobStatus, PollReport};
use crate::error::VisError;
use crate::{log_info, log_warn};

/// External asynchronous processing service.
pub trait JobService: Send + Sync {
    /// Create a job; returns the service-issued id. Any rejection is final.
    fn submit_job(&self, kind: JobKind, params: &Value) -> Result<String, VisError>;

    /// One status request for `id`.
    fn poll_job(&self, id: &str) -> Result<PollReport, VisError>;
}

/// Shared cancellation flag, checked between polls and during waits.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long to keep polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollBudget {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Fast detection-style jobs: ~1 minute.
    pub fn detection() -> Self {
        Self::new(Duration::from_millis(1000), 60)
    }

    /// Full image-generation jobs: ~2 minutes.
    pub fn generation() -> Self {
        Self::new(Duration::from_millis(1000), 120)
    }

    /// Upper bound on wall-clock time spent waiting.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Granularity of cancellable sleeps.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Submits jobs and drives them to a terminal state.
#[derive(Clone)]
pub struct JobClient {
    service: Arc<dyn JobService>,
}

impl JobClient {
    pub fn new(service: Arc<dyn JobService>) -> Self {
        Self { service }
    }

    /// Create a job. Rejections surface as `Submission` and are never retried.
    pub fn submit(&self, kind: JobKind, params: &Value) -> Result<Job, VisError> {
        match self.service.submit_job(kind, params) {
            Ok(id) => {
                log_info!("Submitted {} job {}", kind, id);
                Ok(Job::submitted(id, kind))
            }
            Err(VisError::Submission(msg)) => {
                log_warn!("{} job rejected: {}", kind, msg);
                Err(VisError::Submission(msg))
            }
            Err(other) => {
                log_warn!("{} job could not be submitted: {}", kind, other);
                Err(VisError::Submission(other.to_string()))
            }
        }
    }

    /// Poll until the job is terminal or `budget` runs out.
    ///
    /// Returns the job in `Succeeded`, `Failed` or `TimedOut`. The only error
    /// is `Cancelled`, after which no further status request is issued.
    pub fn await_result(
        &self,
        mut job: Job,
        budget: PollBudget,
        cancel: &CancelFlag,
    ) -> Result<Job, VisError> {
        if job.is_terminal() {
            return Ok(job);
        }
        job.status = JobStatus::Running;

        while job.polls < budget.max_attempts {
            if !wait(budget.interval, cancel) {
                log_info!("Stopped polling {} job {} (cancelled)", job.kind, job.id);
                return Err(VisError::Cancelled);
            }
            job.polls += 1;

            match self.service.poll_job(&job.id) {
                Ok(PollReport::Running) => {
                    if job.polls % 10 == 0 {
                        log_info!("{} job {}: attempt {} running", job.kind, job.id, job.polls);
                    }
                }
                Ok(PollReport::Succeeded { result }) => {
                    log_info!(
                        "{} job {} succeeded after {} polls",
                        job.kind,
                        job.id,
                        job.polls
                    );
                    job.status = JobStatus::Succeeded;
                    job.result = Some(result);
                    return Ok(job);
                }
                Ok(PollReport::Failed { message }) => {
                    log_warn!("{} job {} failed: {}", job.kind, job.id, message);
                    job.status = JobStatus::Failed;
                    job.error = Some(message);
                    return Ok(job);
                }
                Err(e) => {
                    let transient = VisError::TransientPoll(e.to_string());
                    log_warn!(
                        "{} job {}: attempt {}/{}: {}",
                        job.kind,
                        job.id,
                        job.polls,
                        budget.max_attempts,
                        transient
                    );
                }
            }
        }

        log_warn!(
            "{} job {} timed out after {} polls",
            job.kind,
            job.id,
            job.polls
        );
        job.status = JobStatus::TimedOut;
        Ok(job)
    }

    /// Submit and wait in one call.
    pub fn run(
        &self,
        kind: JobKind,
        params: &Value,
        budget: PollBudget,
        cancel: &CancelFlag,
    ) -> Result<Job, VisError> {
        if cancel.is_cancelled() {
            return Err(VisError::Cancelled);
        }
        let job = self.submit(kind, params)?;
        self.await_result(job, budget, cancel)
    }
}

/// Sleep for `interval` in small slices. `false` if cancelled first.
fn wait(interval: Duration, cancel: &CancelFlag) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    let deadline = Instant::now() + interval;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return !cancel.is_cancelled();
        }
        std::thread::sleep((deadline - now).min(WAIT_SLICE));
        if cancel.is_cancelled() {
            return false;
        }
    }
}
