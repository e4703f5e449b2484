//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{DateTime, Local, TimeZone};
use focus_timer::{
    Collaborators, Config, HistoryStore, ManualClock, ManualTicker, MemoryStorage,
    RecordingNotifier, Storage, TimerController, TimerState,
};

static TRACING: Once = Once::new();

/// Routes `tracing` output through the test harness. Honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn t0() -> DateTime<Local> {
    Local.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Config with exact second durations (25 min / 5 min by default).
pub fn config_secs(work: u64, rest: u64) -> Config {
    Config {
        work_duration: work as f64 / 60.0,
        break_duration: rest as f64 / 60.0,
        ..Config::default()
    }
}

/// A controller wired entirely to fakes, plus handles to observe them.
pub struct Harness {
    pub timer: TimerController,
    pub clock: ManualClock,
    pub ticker: ManualTicker,
    pub notifier: RecordingNotifier,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        Self::build(config, Arc::new(MemoryStorage::new()), None, RecordingNotifier::new())
    }

    pub fn with_notifier(config: &Config, notifier: RecordingNotifier) -> Self {
        Self::build(config, Arc::new(MemoryStorage::new()), None, notifier)
    }

    pub fn build(
        config: &Config,
        storage: Arc<MemoryStorage>,
        saved: Option<(&TimerState, DateTime<Local>)>,
        notifier: RecordingNotifier,
    ) -> Self {
        init_tracing();
        let now = saved.map(|(_, at)| at).unwrap_or_else(t0);
        let clock = ManualClock::new(now);
        let ticker = ManualTicker::new();
        let history = HistoryStore::load(storage.clone() as Arc<dyn Storage>);
        let collaborators = Collaborators {
            clock: Box::new(clock.clone()),
            ticker: Box::new(ticker.clone()),
            notifier: Box::new(notifier.clone()),
            history,
        };
        let timer = TimerController::restore(config, collaborators, saved.map(|(s, _)| s));
        Self {
            timer,
            clock,
            ticker,
            notifier,
            storage,
        }
    }

    /// Advances the clock one second and delivers one tick, `n` times.
    pub fn tick_n(&mut self, n: u64) -> Vec<focus_timer::PhaseCompletion> {
        let mut completions = Vec::new();
        for _ in 0..n {
            self.clock.advance_secs(1);
            completions.extend(self.timer.tick());
        }
        completions
    }
}
