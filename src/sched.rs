//! Timer facility bound to the async runtime.
//!
//! The sync logic needs three operations from its environment: run a closure
//! after a delay, cancel a pending closure, and read a monotonic clock. This
//! adapter provides them on top of tokio. Timers fire at or after their
//! delay, never earlier; cancellation is idempotent, and a [`TimerHandle`]
//! cancels its timer when dropped so a rescheduled event can never fire
//! twice.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A handle to one scheduled closure.
///
/// Dropping the handle cancels the timer if it has not fired yet.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancels the pending timer. Calling this more than once, or after the
    /// timer fired, has no effect.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Schedules closures on the tokio runtime and provides a monotonic clock.
///
/// Captures the runtime handle at creation, so scheduling keeps working
/// when called from host threads outside the runtime.
#[derive(Debug, Clone)]
pub struct Scheduler {
    origin: Instant,
    runtime: Handle,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a scheduler; `now_micros` counts from this moment.
    ///
    /// Must be called from within a tokio runtime context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            runtime: Handle::current(),
        }
    }

    /// The runtime handle this scheduler spawns onto.
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Monotonic microseconds since the scheduler was created.
    ///
    /// Uses the runtime clock, so paused-time tests observe the same
    /// timeline as the timers.
    #[must_use]
    pub fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// Runs `f` after `delay` on the runtime, unless canceled first.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        TimerHandle { task }
    }
}
