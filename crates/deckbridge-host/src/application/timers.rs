//! Periodic playback timers: the beat emitter and the 1 Hz playback clock.
//!
//! Each timer is its own Tokio task.  Stopping a timer never cancels a tick
//! that is already running; the task finishes the current tick and then
//! exits, so a tick may safely stop its own timer.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Period of the playback clock (time sync and track-end detection).
pub const CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// Beat period for `bpm` beats per minute, or `None` for a zero tempo.
pub fn beat_interval(bpm: u32) -> Option<Duration> {
    (bpm > 0).then(|| Duration::from_millis(60_000 / u64::from(bpm)))
}

/// A running periodic task.  Dropping the handle stops it.
pub struct PeriodicTask {
    name: &'static str,
    _stop: oneshot::Sender<()>,
}

impl PeriodicTask {
    /// Spawns a task calling `tick` every `period`, starting one period from now.
    ///
    /// The task ends when the handle is dropped or `tick` returns `Break`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick resolves immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            debug!(timer = name, "timer stopped");
        });
        debug!(timer = name, period_ms = period.as_millis() as u64, "timer started");
        Self {
            name,
            _stop: stop_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The timers that run while playback is active.
#[derive(Default)]
pub struct TimerSet {
    tasks: Vec<PeriodicTask>,
}

impl TimerSet {
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn replace(&mut self, tasks: Vec<PeriodicTask>) {
        self.tasks = tasks;
    }

    pub fn stop_all(&mut self) {
        self.tasks.clear();
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(PeriodicTask::name).collect()
    }
}
