//! One-second tick sources.
//!
//! A [`Ticker`] only produces the signal. The host loop receives ticks and
//! forwards them to [`TimerController::tick`](crate::TimerController::tick),
//! so every state mutation stays on the controller's context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Signal delivered once per [`TICK_PERIOD`] while a ticker is active.
///
/// Stamped with the run of the ticker that sent it; a [`TickReceiver`] only
/// hands out ticks from the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

pub trait Ticker: Send {
    /// Starts emitting ticks. No-op when already active.
    fn resume(&mut self);

    /// Stops emitting ticks. No-op when already suspended.
    fn suspend(&mut self);

    fn is_active(&self) -> bool;
}

/// Tokio-driven ticker feeding an `mpsc` channel.
///
/// Must be resumed from within a Tokio runtime. Every suspend starts a new
/// generation, so ticks still buffered from before a pause are discarded by
/// the [`TickReceiver`] instead of shortening the next countdown.
pub struct IntervalTicker {
    tx: mpsc::Sender<Tick>,
    generation: Arc<AtomicU64>,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl IntervalTicker {
    /// Creates a suspended ticker and the receiving end of its ticks.
    pub fn channel() -> (Self, TickReceiver) {
        Self::with_period(TICK_PERIOD)
    }

    pub fn with_period(period: Duration) -> (Self, TickReceiver) {
        let (tx, rx) = mpsc::channel(8);
        let generation = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                generation: Arc::clone(&generation),
                period,
                task: None,
            },
            TickReceiver { rx, generation },
        )
    }
}

/// Receiving end of an [`IntervalTicker`].
#[derive(Debug)]
pub struct TickReceiver {
    rx: mpsc::Receiver<Tick>,
    generation: Arc<AtomicU64>,
}

impl TickReceiver {
    /// Next tick of the current run, or `None` once the ticker is dropped.
    pub async fn recv(&mut self) -> Option<Tick> {
        loop {
            let tick = self.rx.recv().await?;
            if self.is_current(tick) {
                return Some(tick);
            }
            trace!(generation = tick.generation, "stale tick dropped");
        }
    }

    pub fn try_recv(&mut self) -> Result<Tick, TryRecvError> {
        loop {
            let tick = self.rx.try_recv()?;
            if self.is_current(tick) {
                return Ok(tick);
            }
            trace!(generation = tick.generation, "stale tick dropped");
        }
    }

    fn is_current(&self, tick: Tick) -> bool {
        tick.generation == self.generation.load(Ordering::SeqCst)
    }
}

impl Ticker for IntervalTicker {
    fn resume(&mut self) {
        if self.is_active() {
            return;
        }

        let tx = self.tx.clone();
        let tick = Tick {
            generation: self.generation.load(Ordering::SeqCst),
        };
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            // First tick lands one full period after resuming.
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                trace!("tick");
                if tx.send(tick).await.is_err() {
                    debug!("tick receiver dropped, stopping ticker");
                    break;
                }
            }
        }));
        debug!(period_ms = period.as_millis() as u64, "ticker resumed");
    }

    fn suspend(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.generation.fetch_add(1, Ordering::SeqCst);
            debug!("ticker suspended");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.suspend();
    }
}

/// Ticker that emits nothing and only records whether it is active.
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    active: Arc<AtomicBool>,
    resumes: Arc<AtomicUsize>,
    suspends: Arc<AtomicUsize>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn suspend_count(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }
}

impl Ticker for ManualTicker {
    fn resume(&mut self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn suspend(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.suspends.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
