//! focus-timer - Pomodoro focus/break timer core.
//!
//! This crate holds the timer side of a focus app: a two-phase state
//! machine, the controller that drives it, a session history log with
//! background persistence, and best-effort phase alerts. Rendering is left
//! to the host, which watches published snapshots.
//!
//! # Modules
//!
//! - [`phase`]: Focus and Break
//! - [`clock`]: wall-clock sources
//! - [`ticker`]: one-second tick sources
//! - [`machine`]: the phase state machine and its saved state
//! - [`history`]: the session log and its background writer
//! - [`storage`]: whole-document durable storage
//! - [`notify`]: phase alerts
//! - [`controller`]: the orchestrating [`TimerController`]
//! - [`config`]: user settings
//! - [`error`]: crate error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use focus_timer::config::{self, Config};
//! use focus_timer::storage::FileStorage;
//! use focus_timer::{
//!     Collaborators, DesktopNotifier, HistoryStore, IntervalTicker, SystemClock, TimerController,
//!     TimerState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> focus_timer::Result<()> {
//!     let config = Config::load(&config::data_path(config::CONFIG_FILE)).with_env_overrides()?;
//!     let state_file = FileStorage::new(config::data_path(config::TIMER_STATE_FILE));
//!     let history = HistoryStore::load(Arc::new(FileStorage::new(
//!         config::data_path(config::HISTORY_FILE),
//!     )));
//!     let (ticker, mut ticks) = IntervalTicker::channel();
//!
//!     let saved = TimerState::load(&state_file);
//!     let mut timer = TimerController::restore(
//!         &config,
//!         Collaborators {
//!             clock: Box::new(SystemClock),
//!             ticker: Box::new(ticker),
//!             notifier: Box::new(DesktopNotifier::new()),
//!             history,
//!         },
//!         saved.as_ref(),
//!     );
//!
//!     timer.start();
//!     while ticks.recv().await.is_some() {
//!         if timer.tick().is_some() {
//!             break;
//!         }
//!     }
//!
//!     timer.save_state(&state_file)?;
//!     timer.flush_history().await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod machine;
pub mod notify;
pub mod phase;
pub mod storage;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use controller::{Collaborators, TimerController, TimerEvent, TimerSnapshot};
pub use error::{Error, Result};
pub use history::{HistoryStore, HistorySummary, SessionRecord, MIN_SESSION_SECS};
pub use machine::{
    MAX_REMAINING_SECS, PhaseCompletion, PhaseDurations, PhaseMachine, TimerState, TransitionError,
};
pub use notify::{
    DesktopNotifier, NotificationCoordinator, NotificationRequest, Notifier, NotifierCall,
    NotifyError, RecordingNotifier, PHASE_ALERT_ID, PHASE_CHANGE_ID,
};
pub use phase::Phase;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use ticker::{IntervalTicker, ManualTicker, Tick, TickReceiver, Ticker, TICK_PERIOD};
