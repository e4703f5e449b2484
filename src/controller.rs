//! Timer orchestration.
//!
//! [`TimerController`] is the only writer of the phase machine and the
//! history list. Host code feeds it user actions and ticks from a single
//! context; views observe it through [`TimerController::subscribe`] and
//! [`TimerController::events`] and never mutate it.

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::config::Config;
use crate::history::{HistoryStore, SessionRecord};
use crate::machine::{PhaseCompletion, PhaseMachine, TimerState, TransitionError};
use crate::notify::{NotificationCoordinator, Notifier};
use crate::phase::Phase;
use crate::storage::Storage;
use crate::ticker::Ticker;

const EVENT_CAPACITY: usize = 64;

/// Everything the controller depends on, supplied by the host.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub ticker: Box<dyn Ticker>,
    pub notifier: Box<dyn Notifier>,
    pub history: HistoryStore,
}

/// Read-only view published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub remaining: u64,
    pub total: u64,
    pub is_running: bool,
    pub activity: String,
    pub sessions_logged: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    Started {
        phase: Phase,
        remaining: u64,
    },
    Stopped {
        phase: Phase,
        remaining: u64,
    },
    PhaseCompleted {
        completion: PhaseCompletion,
        logged: bool,
        /// UI hint; `false` while animations are suppressed.
        celebrate: bool,
    },
    Reset {
        phase: Phase,
        remaining: u64,
    },
    HistoryEdited,
}

pub struct TimerController {
    machine: PhaseMachine,
    history: HistoryStore,
    notifications: NotificationCoordinator,
    clock: Box<dyn Clock>,
    ticker: Box<dyn Ticker>,
    default_activity: String,
    activity: String,
    detail: Option<String>,
    auto_start_next: bool,
    suppress_animation: bool,
    state_tx: watch::Sender<TimerSnapshot>,
    events_tx: broadcast::Sender<TimerEvent>,
}

impl TimerController {
    /// Fresh controller: focus phase, paused, full work duration.
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let machine = PhaseMachine::new(config.durations());
        Self::assemble(config, collaborators, machine)
    }

    /// Controller rebuilt from a saved [`TimerState`].
    ///
    /// Time spent while the app was gone is accounted for: a running phase
    /// that ran out in the meantime completes (and is logged) right here,
    /// and one still running keeps ticking with a fresh alert.
    pub fn restore(config: &Config, collaborators: Collaborators, saved: Option<&TimerState>) -> Self {
        let Some(saved) = saved else {
            return Self::new(config, collaborators);
        };

        let now = collaborators.clock.now();
        let (machine, overdue) = PhaseMachine::restore(saved, config.durations(), now);
        let mut controller = Self::assemble(config, collaborators, machine);
        info!(
            phase = %controller.machine.phase(),
            remaining = controller.machine.remaining(),
            running = controller.machine.is_running(),
            "timer restored"
        );

        if let Some(completion) = overdue {
            controller.finish_phase(completion);
        } else if controller.machine.is_running() {
            controller.ticker.resume();
            controller
                .notifications
                .schedule_completion(controller.machine.phase(), controller.machine.remaining());
        }
        controller.publish();
        controller
    }

    fn assemble(config: &Config, collaborators: Collaborators, machine: PhaseMachine) -> Self {
        let Collaborators {
            clock,
            ticker,
            notifier,
            history,
        } = collaborators;

        let activity = config.default_activity.clone();
        let initial = TimerSnapshot {
            phase: machine.phase(),
            remaining: machine.remaining(),
            total: machine.total(),
            is_running: machine.is_running(),
            activity: activity.clone(),
            sessions_logged: history.len(),
        };
        let (state_tx, _) = watch::channel(initial);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            machine,
            history,
            notifications: NotificationCoordinator::new(notifier, config.sound_enabled),
            clock,
            ticker,
            default_activity: activity.clone(),
            activity,
            detail: None,
            auto_start_next: config.auto_start_next,
            suppress_animation: false,
            state_tx,
            events_tx,
        }
    }

    // ========================================================================
    // Timer operations
    // ========================================================================

    /// Starts or resumes the countdown. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        let now = self.clock.now();
        if !self.machine.start(now) {
            return false;
        }

        self.ticker.resume();
        let (phase, remaining) = (self.machine.phase(), self.machine.remaining());
        self.notifications.schedule_completion(phase, remaining);
        info!(%phase, remaining, "timer started");

        self.emit(TimerEvent::Started { phase, remaining });
        self.publish();
        true
    }

    /// Pauses the countdown, keeping the remaining time.
    pub fn stop(&mut self) -> bool {
        if !self.machine.stop() {
            debug!("stop ignored, not running");
            return false;
        }

        self.ticker.suspend();
        self.notifications.cancel_pending();
        let (phase, remaining) = (self.machine.phase(), self.machine.remaining());
        info!(%phase, remaining, "timer stopped");

        self.emit(TimerEvent::Stopped { phase, remaining });
        self.publish();
        true
    }

    /// One-second step, driven by the ticker. Ignored while paused.
    pub fn tick(&mut self) -> Option<PhaseCompletion> {
        if !self.machine.is_running() {
            trace!("tick ignored while paused");
            return None;
        }

        let now = self.clock.now();
        let completion = self.machine.tick(now);
        if let Some(completion) = &completion {
            self.finish_phase(completion.clone());
        }
        self.publish();
        completion
    }

    /// Ends the current phase now, as if it had run out.
    pub fn skip(&mut self) -> PhaseCompletion {
        let now = self.clock.now();
        let completion = self.machine.complete_phase(now);
        self.finish_phase(completion.clone());
        self.publish();
        completion
    }

    /// Paused, full duration for the current phase, no pending alert.
    pub fn reset_timer(&mut self) {
        self.ticker.suspend();
        self.machine.rewind();
        self.notifications.cancel_pending();
        let (phase, remaining) = (self.machine.phase(), self.machine.remaining());
        debug!(%phase, remaining, "timer reset");

        self.emit(TimerEvent::Reset { phase, remaining });
        self.publish();
    }

    /// Overrides the remaining time of the paused phase.
    pub fn set_remaining(&mut self, seconds: u64) -> Result<(), TransitionError> {
        self.machine.reset(seconds)?;
        self.publish();
        Ok(())
    }

    /// Catches up with wall-clock time after the app was suspended.
    pub fn resume_from_background(&mut self) -> Option<PhaseCompletion> {
        let now = self.clock.now();
        let completion = self.machine.resync(now);
        if let Some(completion) = &completion {
            self.finish_phase(completion.clone());
        }
        self.publish();
        completion
    }

    fn finish_phase(&mut self, completion: PhaseCompletion) {
        self.ticker.suspend();

        let logged = completion.is_loggable()
            && self.history.add(SessionRecord::new(
                completion.phase,
                completion.started_at,
                completion.ended_at,
                self.activity.clone(),
                self.detail.clone(),
            ));
        self.notifications.announce(completion.phase);
        info!(
            completed = %completion.phase,
            next = %self.machine.phase(),
            duration_secs = completion.duration_secs(),
            logged,
            "phase completed"
        );

        self.emit(TimerEvent::PhaseCompleted {
            completion,
            logged,
            celebrate: !self.suppress_animation,
        });

        if self.auto_start_next {
            self.start();
        }
    }

    // ========================================================================
    // Session labels and history edits
    // ========================================================================

    /// Label and detail for the next logged session. Blank labels fall back
    /// to the configured default.
    pub fn set_activity(&mut self, activity: impl Into<String>, detail: Option<String>) {
        let activity = activity.into();
        self.activity = if activity.trim().is_empty() {
            self.default_activity.clone()
        } else {
            activity
        };
        self.detail = detail.filter(|d| !d.trim().is_empty());
        self.publish();
    }

    /// Moves the end of the last logged session. Returns its new duration,
    /// or `None` if nothing was logged yet.
    pub fn set_end_time(&mut self, end: DateTime<Local>) -> Option<i64> {
        let last = self.history.last()?;
        let (activity, detail) = (last.activity.clone(), last.detail.clone());

        self.history.update_last(activity, detail, end);
        self.emit(TimerEvent::HistoryEdited);
        self.publish();
        self.history.last().map(SessionRecord::duration_secs)
    }

    /// Relabels the last logged session, keeping its times.
    pub fn edit_last(&mut self, activity: impl Into<String>, detail: Option<String>) -> bool {
        let Some(end) = self.history.last().map(|r| r.end) else {
            return false;
        };

        let edited = self.history.update_last(activity, detail, end);
        self.emit(TimerEvent::HistoryEdited);
        self.publish();
        edited
    }

    pub fn set_suppress_animation(&mut self, suppress: bool) {
        self.suppress_animation = suppress;
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.machine.phase(),
            remaining: self.machine.remaining(),
            total: self.machine.total(),
            is_running: self.machine.is_running(),
            activity: self.activity.clone(),
            sessions_logged: self.history.len(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<TimerEvent> {
        self.events_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn remaining(&self) -> u64 {
        self.machine.remaining()
    }

    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn flush_history(&self) {
        self.history.flush().await;
    }

    pub fn state(&self) -> TimerState {
        self.machine.snapshot()
    }

    /// Writes the timer state so a relaunch can pick up where this left off.
    pub fn save_state(&self, storage: &dyn Storage) -> crate::Result<()> {
        self.state().save(storage)
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}
