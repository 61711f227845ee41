//! Activity logger thread.
//!
//! The engine never writes files itself. It sends [`ActivityEvent`]s over a
//! bounded crossbeam channel with `try_send`; a dedicated thread owns the
//! [`JsonlWriter`]. A full channel drops the event and bumps a counter that
//! the thread reports on its next record.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{FeedError, Result};
use crate::feed::model::{AnnouncementId, FilterKey, SectionId};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── event type ────────────────────

/// Things worth a line in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    EngineStarted {
        version: String,
        config_hash: String,
    },
    SelectionChanged {
        index: usize,
        filter: FilterKey,
        epoch: u64,
        registered: bool,
    },
    FetchFailed {
        section: SectionId,
        message: String,
    },
    StaleDiscarded {
        details: String,
    },
    ReadAcknowledged {
        id: AnnouncementId,
        filter: FilterKey,
        cursor: usize,
        remaining: u32,
    },
    AcknowledgeFailed {
        id: AnnouncementId,
        message: String,
    },
    TraversalStarted {
        filter: FilterKey,
        session: u64,
        queued: usize,
        remaining: u32,
    },
    TraversalExhausted {
        filter: FilterKey,
        session: u64,
    },
    SessionChanged {
        signed_in: bool,
    },
    Error {
        code: String,
        message: String,
    },
    /// Flush and stop the logger thread.
    Shutdown,
}

// ──────────────────── handle ────────────────────

/// Cloneable, non-blocking sender side of the logger.
#[derive(Debug, Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events land in the returned receiver instead of a
    /// logger thread.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue `event`. Never blocks; a full channel drops it.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped since the logger last reported them.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only while the
    /// channel is full.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread.
///
/// The thread exits on [`ActivityEvent::Shutdown`] or when every handle is
/// dropped.
pub fn spawn_logger(
    jsonl: JsonlConfig,
    channel_capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::channel(channel_capacity);
    let dropped = Arc::clone(&handle.dropped_events);

    let join = thread::Builder::new()
        .name("cfeed-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &dropped))
        .map_err(|e| FeedError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(jsonl);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} activity events dropped under back-pressure"));
            writer.write_entry(&warn);
        }

        match event_to_log_entry(&event) {
            Some(entry) => writer.write_entry(&entry),
            None => break,
        }
    }

    writer.flush();
}

// ──────────────────── conversion ────────────────────

/// `None` for [`ActivityEvent::Shutdown`].
fn event_to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::EngineStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::EngineStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::SelectionChanged {
            index,
            filter,
            epoch,
            registered,
        } => {
            let mut e = LogEntry::new(EventType::SelectionChange, Severity::Info);
            e.filter = Some(*filter);
            e.epoch = Some(*epoch);
            e.cursor = Some(*index);
            e.details = (!registered).then(|| "unregistered".to_string());
            e
        }
        ActivityEvent::FetchFailed { section, message } => {
            let mut e = LogEntry::new(EventType::FetchFailure, Severity::Warning);
            e.section = Some(*section);
            e.ok = Some(false);
            e.error_code = Some("CFE-2001".to_string());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::StaleDiscarded { details } => {
            let mut e = LogEntry::new(EventType::StaleDiscard, Severity::Info);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::ReadAcknowledged {
            id,
            filter,
            cursor,
            remaining,
        } => {
            let mut e = LogEntry::new(EventType::ReadAcknowledged, Severity::Info);
            e.item_id = Some(*id);
            e.filter = Some(*filter);
            e.cursor = Some(*cursor);
            e.remaining = Some(*remaining);
            e.ok = Some(true);
            e
        }
        ActivityEvent::AcknowledgeFailed { id, message } => {
            let mut e = LogEntry::new(EventType::AcknowledgeFailure, Severity::Warning);
            e.item_id = Some(*id);
            e.ok = Some(false);
            e.error_code = Some("CFE-2002".to_string());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::TraversalStarted {
            filter,
            session,
            queued,
            remaining,
        } => {
            let mut e = LogEntry::new(EventType::TraversalStart, Severity::Info);
            e.filter = Some(*filter);
            e.epoch = Some(*session);
            e.remaining = Some(*remaining);
            e.details = Some(format!("queued={queued}"));
            e
        }
        ActivityEvent::TraversalExhausted { filter, session } => {
            let mut e = LogEntry::new(EventType::TraversalExhausted, Severity::Info);
            e.filter = Some(*filter);
            e.epoch = Some(*session);
            e.remaining = Some(0);
            e
        }
        ActivityEvent::SessionChanged { signed_in } => {
            let mut e = LogEntry::new(EventType::SessionChange, Severity::Info);
            e.details = Some(if *signed_in { "signed_in" } else { "signed_out" }.to_string());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}
