pub use self::job::{CronJob, FixedDelayJob, FixedRateJob, Job};
pub use self::queue::{DelayQueue, Delayed};
pub use self::scheduler::{signal::ShutdownToken, FailedJob, ScheduleError, Scheduler};
use futures::{future::BoxFuture, Future};

mod job;
mod queue;
mod scheduler;
mod utils;

pub type Result =
    core::result::Result<(), Box<dyn std::error::Error + core::marker::Send + core::marker::Sync>>;

/// An implementation to store async functions as trait objects in structs.
/// The stored closure receives the scheduler's shutdown token so a long
/// body can bail out once `Scheduler::shutdown` has been called.
pub trait AsyncFn {
    fn call(&self, ctx: ShutdownToken) -> BoxFuture<'static, Result>;
}

impl<T, F> AsyncFn for T
where
    T: (FnOnce(ShutdownToken) -> F) + Clone + Send + 'static,
    F: Future<Output = Result> + Send + 'static,
{
    fn call(&self, ctx: ShutdownToken) -> BoxFuture<'static, Result> {
        Box::pin(self.clone()(ctx))
    }
}
