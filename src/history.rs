//! Session history log.
//!
//! The in-memory list is authoritative while the process runs; the stored
//! document is authoritative at cold start.
//!
//! # Persistence
//!
//! Every mutation encodes the *whole* list on the caller's context and hands
//! the finished bytes to a background writer task. The writer never sees the
//! live list, applies snapshots in submission order, and only logs failures:
//! an append is never rolled back because a write failed.
//!
//! A document tagged with a newer [`HISTORY_VERSION`] is read best-effort and
//! never written back, so fields this build does not know survive.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::phase::Phase;
use crate::storage::Storage;

/// Focus sessions shorter than this are accidental taps and are not logged.
pub const MIN_SESSION_SECS: i64 = 3;

/// Version tag written into the history document.
pub const HISTORY_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub phase: Phase,
    pub activity: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl SessionRecord {
    pub fn new(
        phase: Phase,
        start: DateTime<Local>,
        end: DateTime<Local>,
        activity: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end: end.max(start),
            phase,
            activity: activity.into(),
            detail,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    pub fn is_loggable(&self) -> bool {
        self.phase == Phase::Focus && self.duration_secs() >= MIN_SESSION_SECS
    }
}

#[derive(Serialize)]
struct HistoryDocumentRef<'a> {
    version: u32,
    sessions: &'a [SessionRecord],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryDocument {
    Versioned {
        version: u32,
        sessions: Vec<SessionRecord>,
    },
    Legacy(Vec<SessionRecord>),
}

/// Totals computed from the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub total_sessions: usize,
    pub total_focus_secs: i64,
    pub sessions_today: usize,
    pub focus_secs_today: i64,
}

pub struct HistoryStore {
    records: Vec<SessionRecord>,
    writer: HistoryWriter,
    read_only: bool,
}

impl HistoryStore {
    /// Loads the stored history and starts the background writer.
    ///
    /// Never fails: a missing, unreadable or undecodable document yields an
    /// empty history. Must be called from within a Tokio runtime.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let (records, version) = read_records(storage.as_ref());
        let read_only = version > HISTORY_VERSION;
        if read_only {
            error!(
                version,
                supported = HISTORY_VERSION,
                "history written by a newer version; changes will not be saved"
            );
        }
        info!(sessions = records.len(), "history loaded");
        Self {
            records,
            writer: HistoryWriter::spawn(storage),
            read_only,
        }
    }

    /// `true` when the stored document is newer than this build writes.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&SessionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record and schedules a write of the whole list.
    ///
    /// Records that are not loggable focus sessions are dropped and `false`
    /// is returned.
    pub fn add(&mut self, record: SessionRecord) -> bool {
        if !record.is_loggable() {
            debug!(
                phase = %record.phase,
                duration_secs = record.duration_secs(),
                "session too short or not a focus session, not logged"
            );
            return false;
        }
        info!(
            id = %record.id,
            activity = %record.activity,
            duration_secs = record.duration_secs(),
            "session logged"
        );
        self.records.push(record);
        self.persist();
        true
    }

    /// Edits the most recent record in place. No-op on an empty history.
    ///
    /// The end is kept at least [`MIN_SESSION_SECS`] after the start, so an
    /// edit never leaves a record the filter in [`add`](Self::add) would drop.
    pub fn update_last(
        &mut self,
        activity: impl Into<String>,
        detail: Option<String>,
        end: DateTime<Local>,
    ) -> bool {
        let Some(last) = self.records.last_mut() else {
            debug!("update_last on empty history ignored");
            return false;
        };
        last.activity = activity.into();
        last.detail = detail;
        last.end = end.max(last.start + TimeDelta::seconds(MIN_SESSION_SECS));
        debug!(id = %last.id, end = %last.end, "last session edited");
        self.persist();
        true
    }

    pub fn summary(&self, today: NaiveDate) -> HistorySummary {
        self.records
            .iter()
            .fold(HistorySummary::default(), |mut acc, r| {
                let secs = r.duration_secs();
                acc.total_sessions += 1;
                acc.total_focus_secs += secs;
                if r.start.date_naive() == today {
                    acc.sessions_today += 1;
                    acc.focus_secs_today += secs;
                }
                acc
            })
    }

    /// Waits until every snapshot submitted so far has been written or failed.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    fn persist(&self) {
        if self.read_only {
            error!("history is read-only, snapshot not written");
            return;
        }
        let doc = HistoryDocumentRef {
            version: HISTORY_VERSION,
            sessions: &self.records,
        };
        match serde_json::to_vec_pretty(&doc) {
            Ok(bytes) => self.writer.submit(bytes),
            Err(e) => error!(error = %e, "failed to encode history"),
        }
    }
}

/// Stored records and the document version they came with.
fn read_records(storage: &dyn Storage) -> (Vec<SessionRecord>, u32) {
    let bytes = match storage.read_all() {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return (Vec::new(), HISTORY_VERSION),
        Err(e) => {
            warn!(error = %e, "failed to read history, starting empty");
            return (Vec::new(), HISTORY_VERSION);
        }
    };

    match serde_json::from_slice::<HistoryDocument>(&bytes) {
        Ok(HistoryDocument::Versioned { version, sessions }) => (sessions, version),
        Ok(HistoryDocument::Legacy(sessions)) => (sessions, HISTORY_VERSION),
        Err(e) => {
            warn!(error = %e, "history is corrupt, starting empty");
            (Vec::new(), HISTORY_VERSION)
        }
    }
}

enum WriteCommand {
    Write(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Single background task that owns all durable history writes.
struct HistoryWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl HistoryWriter {
    fn spawn(storage: Arc<dyn Storage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage, rx));
        Self { tx }
    }

    fn submit(&self, bytes: Vec<u8>) {
        if self.tx.send(WriteCommand::Write(bytes)).is_err() {
            error!("history writer is gone, snapshot dropped");
        }
    }

    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_writer(storage: Arc<dyn Storage>, mut rx: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        let mut pending = None;
        let mut acks = Vec::new();
        match command {
            WriteCommand::Write(bytes) => pending = Some(bytes),
            WriteCommand::Flush(ack) => acks.push(ack),
        }

        // Each snapshot holds the whole list, so only the newest queued one matters.
        while let Ok(next) = rx.try_recv() {
            match next {
                WriteCommand::Write(bytes) => pending = Some(bytes),
                WriteCommand::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(bytes) = pending {
            write_snapshot(Arc::clone(&storage), bytes).await;
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("history writer stopped");
}

async fn write_snapshot(storage: Arc<dyn Storage>, bytes: Vec<u8>) {
    let len = bytes.len();
    match tokio::task::spawn_blocking(move || storage.write_all(&bytes)).await {
        Ok(Ok(())) => debug!(bytes = len, "history written"),
        Ok(Err(e)) => error!(error = %e, "failed to write history"),
        Err(e) => error!(error = %e, "history write task failed"),
    }
}
