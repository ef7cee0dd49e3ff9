use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What the scheduler wants done after a reschedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The buffer reached the batch size: flush immediately.
    FlushNow,
    /// Below the batch size: (re)arm the quiescence timer.
    Arm,
}

struct PendingTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Decides when a flush should happen: either the buffer reaches
/// `batch_size`, or `time_threshold` passes without another reschedule.
///
/// Owns at most one quiescence timer. Arming replaces (and aborts) the
/// previous one. Each timer carries a generation number so that a timer
/// which already woke up before being replaced can be recognised as stale
/// via [`FlushScheduler::fire`].
pub struct FlushScheduler {
    batch_size: usize,
    time_threshold: Duration,
    timer: Option<PendingTimer>,
    generation: u64,
}

impl FlushScheduler {
    pub fn new(batch_size: usize, time_threshold: Duration) -> Self {
        Self {
            batch_size,
            time_threshold,
            timer: None,
            generation: 0,
        }
    }

    /// Size takes priority over time.
    pub fn decide(&self, buffered: usize) -> Decision {
        if buffered >= self.batch_size {
            Decision::FlushNow
        } else {
            Decision::Arm
        }
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }

    /// Replace any pending timer with a fresh one that calls `on_expiry`
    /// with its generation once `time_threshold` has elapsed.
    ///
    /// The deadline is fixed here, not when the timer task is first polled.
    pub fn arm<F>(&mut self, runtime: &Handle, on_expiry: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let deadline = Instant::now() + self.time_threshold;

        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expiry(generation);
        });

        self.timer = Some(PendingTimer { generation, task });
    }

    /// Called by an expired timer. Returns `true` and releases the timer
    /// slot if `generation` is the currently armed timer, `false` if the
    /// timer was replaced or cancelled in the meantime.
    pub fn fire(&mut self, generation: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.generation == generation => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
