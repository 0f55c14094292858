//! Cancellable recurring task.
//!
//! Owns at most one spawned loop. `start` on a running task is a no-op, so a
//! tick body can never run on two timers at once.
//!
//! Stopping is cooperative: the loop exits between ticks, and a tick already
//! in progress runs to completion. A restart waits for that tick first.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

struct Running {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct TaskState {
    running: Option<Running>,
    /// Stopped loop that may still be finishing its last tick.
    draining: Option<JoinHandle<()>>,
}

pub struct RecurringTask {
    name: &'static str,
    state: Mutex<TaskState>,
}

impl RecurringTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(TaskState::default()),
        }
    }

    /// Run `tick` every `period`, first after one full period.
    ///
    /// Returns `false` when already running or when called outside a Tokio
    /// runtime.
    pub fn start<F, Fut>(&self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state
            .running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
        {
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(task = self.name, error = %e, "Cannot start recurring task outside a runtime");
                return false;
            }
        };

        let previous = state
            .draining
            .take()
            .or_else(|| state.running.take().map(|r| r.handle));
        let (shutdown, mut stopped) = watch::channel(false);
        let name = self.name;
        let handle = runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(task = name, error = %e, "Previous recurring task ended abnormally");
                }
            }
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    // Fires on stop and when the owner is dropped.
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {}
                }
                tick().await;
            }
            debug!(task = name, "Recurring task exited");
        });
        state.running = Some(Running { handle, shutdown });
        debug!(task = self.name, period_ms = period.as_millis() as u64, "Recurring task started");
        true
    }

    /// Cancel future ticks. A tick in progress completes. Returns `false`
    /// when not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        match state.running.take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                state.draining = Some(running.handle);
                debug!(task = self.name, "Recurring task stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}
