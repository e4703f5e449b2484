//! Best-effort phase alerts.
//!
//! The timer never depends on an alert actually showing up. Permission
//! refusals and scheduling errors are logged at debug level and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(all(unix, not(target_os = "macos")))]
use notify_rust::Urgency;
use notify_rust::Notification;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::phase::Phase;

/// Identifier of the alert for the running phase's end, so a new one always
/// replaces the old.
pub const PHASE_ALERT_ID: &str = "focus-timer.phase-complete";

/// Identifier of the immediate alert fired when a phase has just ended.
pub const PHASE_CHANGE_ID: &str = "focus-timer.phase-change";

const APP_NAME: &str = "focus-timer";

/// Same-titled desktop alerts closer together than this are shown once.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,

    #[error("failed to schedule notification: {0}")]
    Schedule(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub id: String,
    pub title: String,
    pub body: String,
    pub after: Duration,
    pub sound: bool,
}

pub trait Notifier: Send {
    fn request_permission(&mut self) -> bool;

    fn schedule(&mut self, request: NotificationRequest) -> Result<(), NotifyError>;

    fn cancel(&mut self, id: &str);
}

/// Turns timer transitions into notifier calls.
///
/// Every schedule is preceded by a cancel of [`PHASE_ALERT_ID`], so at most
/// one completion alert is ever pending. The phase-change alert lives under
/// [`PHASE_CHANGE_ID`] and survives the next phase being started right away.
pub struct NotificationCoordinator {
    notifier: Box<dyn Notifier>,
    permission: Option<bool>,
    sound: bool,
}

impl NotificationCoordinator {
    pub fn new(notifier: Box<dyn Notifier>, sound: bool) -> Self {
        Self {
            notifier,
            permission: None,
            sound,
        }
    }

    /// Alert for when `phase` runs out, `after_secs` from now.
    pub fn schedule_completion(&mut self, phase: Phase, after_secs: u64) {
        self.replace(PHASE_ALERT_ID, phase, Duration::from_secs(after_secs));
    }

    /// Immediate alert that `completed` just ended. Takes over from the
    /// completion alert, which is cancelled.
    pub fn announce(&mut self, completed: Phase) {
        self.replace(PHASE_CHANGE_ID, completed, Duration::ZERO);
    }

    pub fn cancel_pending(&mut self) {
        self.notifier.cancel(PHASE_ALERT_ID);
    }

    fn replace(&mut self, id: &str, phase: Phase, after: Duration) {
        self.notifier.cancel(PHASE_ALERT_ID);
        if !self.permitted() {
            debug!(%phase, "notification permission denied, alert skipped");
            return;
        }

        let (title, body) = phase.completion_message();
        let request = NotificationRequest {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            after,
            sound: self.sound,
        };
        match self.notifier.schedule(request) {
            Ok(()) => debug!(%phase, after_secs = after.as_secs(), "phase alert scheduled"),
            Err(e) => debug!(%phase, error = %e, "phase alert not scheduled"),
        }
    }

    fn permitted(&mut self) -> bool {
        match self.permission {
            Some(granted) => granted,
            None => {
                let granted = self.notifier.request_permission();
                self.permission = Some(granted);
                granted
            }
        }
    }
}

// ============================================================================
// Desktop notifications
// ============================================================================

/// Desktop notifier built on `notify-rust`.
///
/// Delays are served by a sleeping Tokio task per id, so scheduling must
/// happen inside a Tokio runtime. A scheduled completion alert can wake at
/// the same moment the phase-change alert is fired; whichever claims the
/// title first is shown and the other is dropped.
#[derive(Default)]
pub struct DesktopNotifier {
    pending: HashMap<String, JoinHandle<()>>,
    recent: RecentAlerts,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for DesktopNotifier {
    fn request_permission(&mut self) -> bool {
        true
    }

    fn schedule(&mut self, request: NotificationRequest) -> Result<(), NotifyError> {
        self.cancel(&request.id);
        let id = request.id.clone();
        let recent = self.recent.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(request.after).await;
            if !recent.claim(&request.title, Instant::now()) {
                debug!(title = %request.title, "duplicate desktop alert dropped");
                return;
            }
            let shown = tokio::task::spawn_blocking(move || show(&request)).await;
            if let Ok(Err(e)) = shown {
                debug!(error = %e, "desktop notification failed");
            }
        });
        self.pending.insert(id, task);
        Ok(())
    }

    fn cancel(&mut self, id: &str) {
        if let Some(task) = self.pending.remove(id) {
            task.abort();
        }
    }
}

impl Drop for DesktopNotifier {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}

/// Titles of recently shown alerts, shared by every pending task.
#[derive(Debug, Clone, Default)]
struct RecentAlerts(Arc<Mutex<HashMap<String, Instant>>>);

impl RecentAlerts {
    /// Returns `true` if `title` may be shown at `now`, and records it.
    fn claim(&self, title: &str, now: Instant) -> bool {
        let mut shown = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        shown.retain(|_, at| now.saturating_duration_since(*at) < DUPLICATE_WINDOW);
        if shown.contains_key(title) {
            return false;
        }
        shown.insert(title.to_string(), now);
        true
    }
}

fn show(request: &NotificationRequest) -> Result<(), NotifyError> {
    let mut notification = Notification::new();
    notification
        .summary(&request.title)
        .body(&request.body)
        .appname(APP_NAME);
    #[cfg(all(unix, not(target_os = "macos")))]
    notification.icon("alarm-clock").urgency(Urgency::Critical);

    notification
        .show()
        .map_err(|e| NotifyError::Schedule(e.to_string()))?;

    if request.sound {
        play_sound();
    }
    Ok(())
}

fn play_sound() {
    for (cmd, file) in [
        ("paplay", "/usr/share/sounds/freedesktop/stereo/complete.oga"),
        ("aplay", "/usr/share/sounds/sound-icons/guitar-11.wav"),
        ("aplay", "/usr/share/sounds/generic.wav"),
    ] {
        if std::path::Path::new(file).exists() {
            let _ = std::process::Command::new(cmd)
                .arg(file)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn();
            break;
        }
    }
}

// ============================================================================
// Recording notifier
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    RequestPermission,
    Schedule(NotificationRequest),
    Cancel(String),
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<NotifierCall>,
    pending: HashMap<String, NotificationRequest>,
}

/// Notifier that records every call and tracks what would be pending.
///
/// Clones share the same log.
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    granted: bool,
    fail: bool,
    log: Arc<Mutex<Recorded>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            granted: true,
            fail: false,
            log: Arc::default(),
        }
    }

    /// A notifier whose permission prompt is refused.
    pub fn denied() -> Self {
        Self {
            granted: false,
            ..Self::new()
        }
    }

    /// A notifier that grants permission but fails every schedule.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn pending(&self) -> Vec<NotificationRequest> {
        self.lock().pending.values().cloned().collect()
    }

    pub fn schedule_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, NotifierCall::Schedule(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn request_permission(&mut self) -> bool {
        self.lock().calls.push(NotifierCall::RequestPermission);
        self.granted
    }

    fn schedule(&mut self, request: NotificationRequest) -> Result<(), NotifyError> {
        let mut log = self.lock();
        log.calls.push(NotifierCall::Schedule(request.clone()));
        if !self.granted {
            return Err(NotifyError::PermissionDenied);
        }
        if self.fail {
            return Err(NotifyError::Schedule("recording notifier set to fail".into()));
        }
        log.pending.insert(request.id.clone(), request);
        Ok(())
    }

    fn cancel(&mut self, id: &str) {
        let mut log = self.lock();
        log.calls.push(NotifierCall::Cancel(id.to_string()));
        log.pending.remove(id);
    }
}
