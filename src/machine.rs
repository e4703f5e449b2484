//! Focus/break phase state machine.
//!
//! The machine cycles `Focus -> Break -> Focus` forever. It counts down one
//! second per tick while running, and also remembers the absolute end of the
//! running phase so the countdown can be rebuilt after the process was
//! suspended ([`PhaseMachine::resync`]).

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::history::MIN_SESSION_SECS;
use crate::phase::Phase;
use crate::storage::Storage;

/// Longest countdown [`PhaseMachine::reset`] accepts: one day.
pub const MAX_REMAINING_SECS: u64 = 24 * 60 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The operation is only legal while the timer is paused.
    #[error("timer is running; pause it first")]
    Running,
}

/// Configured phase lengths in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub work: u64,
    pub rest: u64,
}

impl PhaseDurations {
    pub fn new(work: u64, rest: u64) -> Self {
        Self {
            work: work.max(1),
            rest: rest.max(1),
        }
    }

    pub fn of(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Focus => self.work,
            Phase::Break => self.rest,
        }
    }
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self::new(25 * 60, 5 * 60)
    }
}

/// Emitted whenever a phase ends, naturally or by skipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCompletion {
    pub phase: Phase,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
}

impl PhaseCompletion {
    pub fn duration_secs(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }

    /// Whether this completion should become a history entry.
    pub fn is_loggable(&self) -> bool {
        self.phase == Phase::Focus && self.duration_secs() >= MIN_SESSION_SECS
    }
}

/// Persistable view of the machine, written when the app is suspended or quit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimerState {
    pub phase: Phase,
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub work_duration: u64,
    pub break_duration: u64,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub phase_ends_at: Option<DateTime<Local>>,
}

impl TimerState {
    /// Reads a saved state. Missing or unreadable state yields `None`.
    pub fn load(storage: &dyn Storage) -> Option<Self> {
        let bytes = match storage.read_all() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read timer state");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "discarding unreadable timer state");
                None
            }
        }
    }

    pub fn save(&self, storage: &dyn Storage) -> crate::Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        storage.write_all(&bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
    remaining: u64,
    running: bool,
    durations: PhaseDurations,
    started_at: Option<DateTime<Local>>,
    ends_at: Option<DateTime<Local>>,
}

impl PhaseMachine {
    /// Focus, paused, with a full work duration on the clock.
    pub fn new(durations: PhaseDurations) -> Self {
        Self {
            phase: Phase::Focus,
            remaining: durations.work,
            running: false,
            durations,
            started_at: None,
            ends_at: None,
        }
    }

    /// Rebuilds a machine from saved state using the current durations.
    ///
    /// A phase that was running is resynced against `now`; the returned
    /// completion is `Some` when it ran out while the process was away.
    pub fn restore(
        state: &TimerState,
        durations: PhaseDurations,
        now: DateTime<Local>,
    ) -> (Self, Option<PhaseCompletion>) {
        let mut machine = Self {
            phase: state.phase,
            remaining: state.remaining_seconds.min(durations.of(state.phase)),
            running: state.is_running && state.phase_ends_at.is_some(),
            durations,
            started_at: state.phase_started_at,
            ends_at: state.phase_ends_at.filter(|_| state.is_running),
        };
        if machine.remaining == 0 && !machine.running {
            machine.remaining = durations.of(machine.phase);
        }
        let completion = machine.resync(now);
        (machine, completion)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    pub fn total(&self) -> u64 {
        self.durations.of(self.phase)
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    pub fn ends_at(&self) -> Option<DateTime<Local>> {
        self.ends_at
    }

    /// Paused -> Running. Returns `false` if it was already running.
    pub fn start(&mut self, now: DateTime<Local>) -> bool {
        if self.running {
            debug!(phase = %self.phase, "start ignored, already running");
            return false;
        }
        if self.remaining == 0 {
            self.remaining = self.total();
        }
        self.started_at.get_or_insert(now);
        // Out of chrono's range means no absolute end; ticks still count down.
        self.ends_at = now.checked_add_signed(secs(self.remaining));
        self.running = true;
        true
    }

    /// Running -> Paused, keeping the remaining time.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.ends_at = None;
        true
    }

    /// One-second countdown step. Ignored while paused.
    pub fn tick(&mut self, now: DateTime<Local>) -> Option<PhaseCompletion> {
        if !self.running {
            trace!("tick ignored while paused");
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return Some(self.complete_phase(now));
        }
        None
    }

    /// Ends the current phase and flips to the next one, paused.
    pub fn complete_phase(&mut self, now: DateTime<Local>) -> PhaseCompletion {
        let completion = PhaseCompletion {
            phase: self.phase,
            started_at: self.started_at.unwrap_or(now).min(now),
            ended_at: now,
        };

        self.running = false;
        self.phase = self.phase.next();
        self.remaining = self.total();
        self.started_at = None;
        self.ends_at = None;

        completion
    }

    /// Overrides the remaining time, capped at [`MAX_REMAINING_SECS`]. Only
    /// legal while paused.
    pub fn reset(&mut self, seconds: u64) -> Result<(), TransitionError> {
        if self.running {
            return Err(TransitionError::Running);
        }
        self.remaining = seconds.min(MAX_REMAINING_SECS);
        Ok(())
    }

    /// Forces paused with the full duration of the current phase.
    pub fn rewind(&mut self) {
        self.running = false;
        self.remaining = self.total();
        self.started_at = None;
        self.ends_at = None;
    }

    /// Recomputes the remaining time from the absolute phase end.
    ///
    /// Completes the phase, stamped with its scheduled end, when that end
    /// has already passed.
    pub fn resync(&mut self, now: DateTime<Local>) -> Option<PhaseCompletion> {
        let ends_at = match (self.running, self.ends_at) {
            (true, Some(ends_at)) => ends_at,
            _ => return None,
        };

        let left = ends_at - now;
        // Partial seconds still count as a second on the display.
        let whole = left.num_seconds() + i64::from(left.subsec_nanos() > 0);
        self.remaining = whole.max(0) as u64;
        debug!(phase = %self.phase, remaining = self.remaining, "resynced countdown");

        if self.remaining == 0 {
            return Some(self.complete_phase(ends_at));
        }
        None
    }

    pub fn snapshot(&self) -> TimerState {
        TimerState {
            phase: self.phase,
            remaining_seconds: self.remaining,
            is_running: self.running,
            work_duration: self.durations.work,
            break_duration: self.durations.rest,
            phase_started_at: self.started_at,
            phase_ends_at: self.ends_at,
        }
    }
}

fn secs(n: u64) -> TimeDelta {
    i64::try_from(n)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn at(offset: i64) -> DateTime<Local> {
        t0() + TimeDelta::seconds(offset)
    }

    fn machine(work: u64, rest: u64) -> PhaseMachine {
        PhaseMachine::new(PhaseDurations::new(work, rest))
    }

    #[test]
    fn test_initial_state_is_paused_focus() {
        let m = machine(1500, 300);
        assert_eq!(m.phase(), Phase::Focus);
        assert_eq!(m.remaining(), 1500);
        assert!(!m.is_running());
    }

    #[test]
    fn test_exact_tick_count_completes_once() {
        for d in [1u64, 2, 3, 7, 60] {
            let mut m = machine(d, 5);
            m.start(t0());

            let mut completions = Vec::new();
            for i in 1..=d {
                if i == d {
                    assert_eq!(m.remaining(), 1);
                }
                completions.extend(m.tick(at(i as i64)));
            }

            assert_eq!(completions.len(), 1, "duration {d}");
            assert_eq!(completions[0].phase, Phase::Focus);
            assert_eq!(completions[0].started_at, t0());
            assert_eq!(completions[0].ended_at, at(d as i64));
            assert_eq!(m.phase(), Phase::Break);
            assert_eq!(m.remaining(), 5);
            assert!(!m.is_running());
        }
    }

    #[test]
    fn test_start_twice_is_idempotent() {
        let mut m = machine(1500, 300);
        assert!(m.start(t0()));
        m.tick(at(1));
        let before = (m.remaining(), m.is_running(), m.ends_at());

        assert!(!m.start(at(1)));

        assert_eq!((m.remaining(), m.is_running(), m.ends_at()), before);
    }

    #[test]
    fn test_stop_preserves_remaining() {
        let mut m = machine(1500, 300);
        m.start(t0());
        for i in 1..=100 {
            m.tick(at(i));
        }

        assert!(m.stop());
        assert_eq!(m.remaining(), 1400);
        assert!(!m.stop());

        m.start(at(200));
        assert_eq!(m.remaining(), 1400);
        assert_eq!(m.ends_at(), Some(at(1600)));
        assert_eq!(m.started_at(), Some(t0()));
    }

    #[test]
    fn test_tick_while_paused_is_ignored() {
        let mut m = machine(10, 5);
        assert!(m.tick(at(1)).is_none());
        assert_eq!(m.remaining(), 10);
    }

    #[test]
    fn test_reset_rejected_while_running() {
        let mut m = machine(10, 5);
        m.start(t0());
        assert_eq!(m.reset(3), Err(TransitionError::Running));

        m.stop();
        assert_eq!(m.reset(3), Ok(()));
        assert_eq!(m.remaining(), 3);
    }

    #[test]
    fn test_reset_caps_huge_values() {
        let mut m = machine(10, 5);
        assert_eq!(m.reset(u64::MAX), Ok(()));
        assert_eq!(m.remaining(), MAX_REMAINING_SECS);

        assert!(m.start(t0()));
        assert_eq!(m.ends_at(), Some(at(MAX_REMAINING_SECS as i64)));
    }

    #[test]
    fn test_start_with_unrepresentable_end_keeps_counting() {
        let mut m = machine(u64::MAX, 5);

        assert!(m.start(t0()));
        assert!(m.is_running());
        assert_eq!(m.ends_at(), None);
        assert!(m.resync(at(10)).is_none());

        m.tick(at(1));
        assert_eq!(m.remaining(), u64::MAX - 1);
    }

    #[test]
    fn test_break_completion_returns_to_focus() {
        let mut m = machine(2, 2);
        m.start(t0());
        m.tick(at(1));
        m.tick(at(2));
        m.start(at(2));
        m.tick(at(3));
        let done = m.tick(at(4)).unwrap();

        assert_eq!(done.phase, Phase::Break);
        assert!(!done.is_loggable());
        assert_eq!(m.phase(), Phase::Focus);
        assert_eq!(m.remaining(), 2);
    }

    #[test]
    fn test_short_focus_is_not_loggable() {
        let short = PhaseCompletion {
            phase: Phase::Focus,
            started_at: t0(),
            ended_at: at(2),
        };
        let exact = PhaseCompletion {
            ended_at: at(3),
            ..short.clone()
        };
        assert!(!short.is_loggable());
        assert!(exact.is_loggable());
    }

    #[test]
    fn test_resync_accounts_for_background_time() {
        let mut m = machine(1500, 300);
        m.start(t0());
        m.tick(at(1));

        assert!(m.resync(at(601)).is_none());
        assert_eq!(m.remaining(), 899);
    }

    #[test]
    fn test_resync_completes_overdue_phase_at_scheduled_end() {
        let mut m = machine(1500, 300);
        m.start(t0());

        let done = m.resync(at(4000)).unwrap();

        assert_eq!(done.ended_at, at(1500));
        assert_eq!(m.phase(), Phase::Break);
        assert_eq!(m.remaining(), 300);
        assert!(!m.is_running());
    }

    #[test]
    fn test_resync_ignores_paused_machine() {
        let mut m = machine(1500, 300);
        assert!(m.resync(at(9999)).is_none());
        assert_eq!(m.remaining(), 1500);
    }

    #[test]
    fn test_restore_round_trips_paused_state() {
        let mut m = machine(1500, 300);
        m.start(t0());
        m.tick(at(1));
        m.stop();

        let (restored, done) = PhaseMachine::restore(&m.snapshot(), m.durations(), at(5000));

        assert!(done.is_none());
        assert_eq!(restored.remaining(), 1499);
        assert!(!restored.is_running());
        assert_eq!(restored.started_at(), Some(t0()));
    }

    #[test]
    fn test_restore_clamps_to_new_duration() {
        let mut state = machine(1500, 300).snapshot();
        state.remaining_seconds = 1500;

        let (restored, _) = PhaseMachine::restore(&state, PhaseDurations::new(600, 300), t0());

        assert_eq!(restored.remaining(), 600);
    }
}
