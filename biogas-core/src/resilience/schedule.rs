//! Cancellable deferred retry
//!
//! The retry timer is an explicit task whose handle lives in the driver.
//! Cancelling (or dropping) it aborts the task; a firing that raced the
//! cancellation carries a token the driver no longer recognises.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Identifies one armed timer
pub type RetryToken = u64;

/// A pending retry
#[derive(Debug)]
pub struct ScheduledRetry {
    token: RetryToken,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl ScheduledRetry {
    /// Arm a timer that sends `token` on `fire` once `delay` has elapsed
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm(delay: Duration, token: RetryToken, fire: mpsc::UnboundedSender<RetryToken>) -> Self {
        let deadline = Instant::now() + delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fire.send(token);
        });
        Self {
            token,
            deadline,
            task,
        }
    }

    pub fn token(&self) -> RetryToken {
        self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the retry fires
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Disarm the timer
    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for ScheduledRetry {
    fn drop(&mut self) {
        self.task.abort();
    }
}
