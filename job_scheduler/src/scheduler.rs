use self::signal::{Shutdown, ShutdownToken};
use crate::{
    job::{CronJob, FixedDelayJob, FixedRateJob, Job},
    queue::DelayQueue,
    AsyncFn,
};
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};

pub(crate) mod signal;

/// How long the dispatcher blocks on the queue before re-checking the
/// shutdown signal.
const TAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a scheduling call was refused. The job is not enqueued in any of
/// these cases.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("rate must be a positive duration")]
    InvalidRate,
    #[error("delay must be a positive duration")]
    InvalidDelay,
    #[error("invalid cron expression: {0}")]
    InvalidExpression(#[from] cron::ParseError),
    #[error("scheduler has been shut down")]
    ShutDown,
}

/// One recorded runtime failure. Carries the job's description rather
/// than the job itself, because the job value goes straight back into the
/// queue to keep its schedule.
#[derive(Debug)]
pub struct FailedJob {
    job: String,
    error: Box<dyn std::error::Error + Send + Sync>,
}

impl FailedJob {
    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn error(&self) -> &(dyn std::error::Error + Send + Sync) {
        &*self.error
    }
}

/// An in-process scheduler over three trigger kinds: fixed-rate,
/// fixed-delay and cron.
///
/// A dedicated dispatcher thread owns the consuming side of the delay
/// queue. Whenever the earliest job comes due it is popped and its body is
/// spawned onto the scheduler's runtime, so bodies run concurrently with
/// each other and with the dispatcher. After a body finishes, successfully
/// or not, the job is offered back to the queue for its next fire time.
///
/// Failures never silently disappear: a body that returns an error or
/// panics is recorded in [`Scheduler::failed_jobs`] and stays on its
/// schedule.
///
/// # Example
///
/// ```no_run
/// use job_scheduler::{Scheduler, ShutdownToken};
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new();
/// scheduler
///     .with_fixed_rate(
///         |_ctx: ShutdownToken| async {
///             println!("tick");
///             Ok(())
///         },
///         Duration::from_secs(1),
///         Duration::ZERO,
///     )
///     .unwrap();
///
/// std::thread::sleep(Duration::from_secs(5));
/// scheduler.shutdown();
/// ```
pub struct Scheduler {
    queue: Arc<DelayQueue<Box<dyn Job>>>,
    failed: Arc<Mutex<Vec<FailedJob>>>,
    signal: Shutdown,
    dispatcher: Option<JoinHandle<()>>,
    runtime: Option<Runtime>,
}

impl Scheduler {
    /// Builds the runtime and starts the dispatcher. The scheduler is
    /// ready to accept jobs as soon as this returns.
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .thread_name("job-runner")
            .build()
            .expect("failed to build the job runtime");
        let queue = Arc::new(DelayQueue::new());
        let failed = Arc::new(Mutex::new(Vec::new()));
        let signal = Shutdown::new();

        let dispatcher = thread::Builder::new()
            .name("job-dispatcher".into())
            .spawn({
                let queue = Arc::clone(&queue);
                let failed = Arc::clone(&failed);
                let handle = runtime.handle().clone();
                let token = signal.token();
                move || dispatch(queue, failed, handle, token)
            })
            .expect("failed to spawn the dispatcher thread");

        Self {
            queue,
            failed,
            signal,
            dispatcher: Some(dispatcher),
            runtime: Some(runtime),
        }
    }

    /// Schedules `run` every `rate`, measured start-to-start. The first
    /// firing happens `initial_delay` from now.
    pub fn with_fixed_rate<F>(
        &self,
        run: F,
        rate: Duration,
        initial_delay: Duration,
    ) -> Result<(), ScheduleError>
    where
        F: AsyncFn + Send + 'static,
    {
        self.check_running()?;
        let job = FixedRateJob::new(run, rate, initial_delay)?;
        self.submit(Box::new(job));
        Ok(())
    }

    /// Schedules `run` so that each firing starts `delay` after the
    /// previous one completed.
    pub fn with_fixed_delay<F>(&self, run: F, delay: Duration) -> Result<(), ScheduleError>
    where
        F: AsyncFn + Send + 'static,
    {
        self.check_running()?;
        let job = FixedDelayJob::new(run, delay)?;
        self.submit(Box::new(job));
        Ok(())
    }

    /// Schedules `run` on a six-field crontab expression. A malformed
    /// expression comes back as [`ScheduleError::InvalidExpression`] with
    /// the parser's diagnosis.
    pub fn with_cron<F>(&self, run: F, expression: &str) -> Result<(), ScheduleError>
    where
        F: AsyncFn + Send + 'static,
    {
        self.check_running()?;
        let job = CronJob::new(run, expression)?;
        self.submit(Box::new(job));
        Ok(())
    }

    /// Stops dispatching and flips every job's shutdown token. Bodies
    /// already running are not aborted; they are expected to notice the
    /// token and return. Scheduling calls fail from here on.
    pub fn shutdown(&self) {
        log::info!("shutting scheduler down");
        self.signal.shut_down();
        self.queue.interrupt();
    }

    /// The runtime failures recorded so far, oldest first. The list only
    /// grows; a failing job stays scheduled.
    pub fn failed_jobs(&self) -> MutexGuard<'_, Vec<FailedJob>> {
        self.failed.lock().expect("failed-jobs lock poisoned")
    }

    fn submit(&self, job: Box<dyn Job>) {
        log::info!("scheduling {}", job.describe());
        self.queue.offer(job);
    }

    fn check_running(&self) -> Result<(), ScheduleError> {
        if self.signal.is_shut_down() {
            Err(ScheduleError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                log::error!("dispatcher thread panicked");
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// The dispatcher loop: pull the earliest-due job, hand its body to the
/// runtime, repeat. The take timeout bounds how long a shutdown can go
/// unnoticed when the queue is quiet; an interrupt cuts it short.
fn dispatch(
    queue: Arc<DelayQueue<Box<dyn Job>>>,
    failed: Arc<Mutex<Vec<FailedJob>>>,
    handle: Handle,
    token: ShutdownToken,
) {
    log::trace!("dispatcher started");
    while !token.is_shut_down() {
        let Some(job) = queue.take_with_timeout(TAKE_TIMEOUT) else {
            continue;
        };
        log::debug!("dispatching {}", job.describe());
        handle.spawn(run_job(
            job,
            Arc::clone(&queue),
            Arc::clone(&failed),
            token.clone(),
        ));
    }
    log::trace!("dispatcher stopped");
}

/// Runs one job body, records a failure if there was one, and offers the
/// job back to the queue. Re-offering is unconditional: errors and panics
/// do not deregister a job.
async fn run_job(
    mut job: Box<dyn Job>,
    queue: Arc<DelayQueue<Box<dyn Job>>>,
    failed: Arc<Mutex<Vec<FailedJob>>>,
    token: ShutdownToken,
) {
    let outcome = AssertUnwindSafe(job.run(token)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => log::debug!("{} finished", job.describe()),
        Ok(Err(error)) => {
            log::warn!("{} failed: {error}", job.describe());
            record(&failed, job.describe(), error);
        }
        Err(panic) => {
            let message = panic_message(panic);
            log::warn!("{} panicked: {message}", job.describe());
            record(&failed, job.describe(), message.into());
        }
    }
    queue.offer(job);
}

fn record(
    failed: &Mutex<Vec<FailedJob>>,
    job: String,
    error: Box<dyn std::error::Error + Send + Sync>,
) {
    failed
        .lock()
        .expect("failed-jobs lock poisoned")
        .push(FailedJob { job, error });
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "job panicked".to_string(),
        },
    }
}
