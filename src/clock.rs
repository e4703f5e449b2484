//! Wall-clock sources.
//!
//! The controller never reads the system time directly; it asks a [`Clock`].
//! [`ManualClock`] lets tests and replays move time by hand.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeDelta};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.lock();
        *now += TimeDelta::seconds(secs);
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.lock() = at;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Local>> {
        // A poisoned clock still holds a valid timestamp.
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.lock()
    }
}
