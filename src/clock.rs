use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of protocol time. Route ages and update intervals are measured
/// against whatever clock the engine was built with.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall time anchored on `tokio::time::Instant`.
///
/// Under a paused tokio runtime the clock advances with the runtime, which
/// lets scheduler tests fast-forward through invalid and flush timers.
#[derive(Debug)]
pub struct RuntimeClock {
    origin_wall: DateTime<Utc>,
    origin_instant: tokio::time::Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self {
            origin_wall: Utc::now(),
            origin_instant: tokio::time::Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin_instant.elapsed();
        self.origin_wall + Duration::from_std(elapsed).unwrap_or(Duration::zero())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
