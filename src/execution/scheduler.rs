use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to (tests, offline replay)
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn period_millis(period: Duration) -> i64 {
    (period.as_millis() as i64).max(1)
}

/// First instant at or after `now` that is a whole multiple of `period` since the epoch
///
/// A two hour period lands on even UTC hours, matching cron `0 */2 * * *`.
pub fn next_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let p = period_millis(period);
    let ms = now.timestamp_millis();
    let floor = ms.div_euclid(p) * p;
    let next = if floor < ms { floor + p } else { floor };
    DateTime::from_timestamp_millis(next).unwrap_or(now)
}

/// Boundary closest to `now`; the scheduled time of a tick that fired slightly early or late
pub fn nearest_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let p = period_millis(period);
    let ms = now.timestamp_millis();
    let floor = ms.div_euclid(p) * p;
    let nearest = if ms - floor >= p / 2 { floor + p } else { floor };
    DateTime::from_timestamp_millis(nearest).unwrap_or(now)
}

/// Clock-aligned periodic job running on its own task
///
/// Ticks that fall behind are skipped rather than replayed in a burst. Dropping the
/// task does not stop it; call `cancel` or `shutdown`.
pub struct RecurringTask {
    name: &'static str,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn `job` every `period`, first firing at the next period boundary
    ///
    /// `job` receives the scheduled time of the tick.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        clock: Arc<dyn Clock>,
        mut job: F,
    ) -> Self
    where
        F: FnMut(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);

        let now = clock.now();
        let first = next_boundary(now, period);
        let delay = (first - now).to_std().unwrap_or_default();
        tracing::info!(task = name, ?period, ?delay, "Scheduling recurring task");

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduled = nearest_boundary(clock.now(), period);
                        tracing::debug!(task = name, %scheduled, "Tick");
                        job(scheduled).await;
                    }
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            tracing::info!(task = name, "Recurring task stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop after the current tick, if one is running
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(task = self.name, "Recurring task panicked: {}", e);
        }
    }
}
