use crate::{queue::Delayed, scheduler::signal::ShutdownToken, AsyncFn, ScheduleError};
use chrono::{Duration, Local, NaiveDateTime};
use cron::Schedule;
use futures::future::BoxFuture;
use std::time;

/// A schedulable unit of work: something the queue can order by delay,
/// and the dispatcher can run and re-enqueue.
///
/// `run` takes `&mut self` because the dispatcher owns a job exclusively
/// from the moment it pops until it re-offers it, so the trigger
/// timestamps can be plain fields.
pub trait Job: Delayed + Send {
    /// The instant this job next wants to fire, on the local wall clock.
    fn next_execution(&self) -> NaiveDateTime;

    /// Runs the user body, updating the trigger's timestamp per its kind.
    fn run(&mut self, ctx: ShutdownToken) -> BoxFuture<'_, crate::Result>;

    /// A short human-readable tag, used in logs and failure records.
    fn describe(&self) -> String;
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn until(next: NaiveDateTime) -> i64 {
    (next - now()).num_nanoseconds().unwrap_or(i64::MAX)
}

fn positive(duration: time::Duration) -> Option<Duration> {
    if duration.is_zero() {
        return None;
    }
    Duration::from_std(duration).ok()
}

/// Fires every `rate`, measured from the previous *start*. A body that
/// overruns its rate is immediately due again once it completes.
pub struct FixedRateJob {
    command: Box<dyn AsyncFn + Send>,
    rate: Duration,
    last_start: NaiveDateTime,
}

impl FixedRateJob {
    /// `rate` must be positive; `initial_delay` postpones only the first
    /// firing.
    pub fn new(
        command: impl AsyncFn + Send + 'static,
        rate: time::Duration,
        initial_delay: time::Duration,
    ) -> Result<Self, ScheduleError> {
        let rate = positive(rate).ok_or(ScheduleError::InvalidRate)?;
        let initial_delay =
            Duration::from_std(initial_delay).map_err(|_| ScheduleError::InvalidDelay)?;
        Ok(Self {
            command: Box::new(command),
            rate,
            // Backdate the start so the first firing lands after exactly
            // the initial delay.
            last_start: now() - rate + initial_delay,
        })
    }
}

impl Delayed for FixedRateJob {
    fn delay(&self) -> i64 {
        until(self.next_execution())
    }
}

impl Job for FixedRateJob {
    fn next_execution(&self) -> NaiveDateTime {
        self.last_start + self.rate
    }

    fn run(&mut self, ctx: ShutdownToken) -> BoxFuture<'_, crate::Result> {
        // Stamped before the body: the rate counts from the start.
        self.last_start = now();
        self.command.call(ctx)
    }

    fn describe(&self) -> String {
        format!("fixed-rate job every {}", self.rate)
    }
}

/// Fires `delay` after the previous *completion*, whether the body
/// succeeded or failed.
pub struct FixedDelayJob {
    command: Box<dyn AsyncFn + Send>,
    delay: Duration,
    last_completion: NaiveDateTime,
}

impl FixedDelayJob {
    pub fn new(
        command: impl AsyncFn + Send + 'static,
        delay: time::Duration,
    ) -> Result<Self, ScheduleError> {
        let delay = positive(delay).ok_or(ScheduleError::InvalidDelay)?;
        Ok(Self {
            command: Box::new(command),
            delay,
            last_completion: now(),
        })
    }
}

impl Delayed for FixedDelayJob {
    fn delay(&self) -> i64 {
        until(self.next_execution())
    }
}

impl Job for FixedDelayJob {
    fn next_execution(&self) -> NaiveDateTime {
        self.last_completion + self.delay
    }

    fn run(&mut self, ctx: ShutdownToken) -> BoxFuture<'_, crate::Result> {
        let body = self.command.call(ctx);
        Box::pin(async move {
            let result = body.await;
            self.last_completion = now();
            result
        })
    }

    fn describe(&self) -> String {
        format!("fixed-delay job every {}", self.delay)
    }
}

/// Fires at the instants of a six-field crontab expression, evaluated
/// from the previous completion.
pub struct CronJob {
    command: Box<dyn AsyncFn + Send>,
    schedule: Schedule,
    last_completion: Option<NaiveDateTime>,
}

impl CronJob {
    pub fn new(
        command: impl AsyncFn + Send + 'static,
        expression: &str,
    ) -> Result<Self, ScheduleError> {
        let schedule: Schedule = expression.parse()?;
        Ok(Self {
            command: Box::new(command),
            schedule,
            last_completion: None,
        })
    }
}

impl Delayed for CronJob {
    fn delay(&self) -> i64 {
        until(self.next_execution())
    }
}

impl Job for CronJob {
    fn next_execution(&self) -> NaiveDateTime {
        self.schedule.next(self.last_completion.unwrap_or_else(now))
    }

    fn run(&mut self, ctx: ShutdownToken) -> BoxFuture<'_, crate::Result> {
        let body = self.command.call(ctx);
        Box::pin(async move {
            let result = body.await;
            self.last_completion = Some(now());
            result
        })
    }

    fn describe(&self) -> String {
        format!("cron job {}", self.schedule)
    }
}
