//! Link events and the sinks that record them.
//!
//! Events are an audit trail of what the supervisor observed. They are never
//! read back by the supervisor itself.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;

/// Kind of link event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventKind {
    /// Supervision started.
    Start,
    /// A liveness check found recent data.
    Pass,
    /// A liveness check found the stream silent for longer than the window.
    Overdue,
    /// A notification payload arrived.
    Received,
    /// The session was torn down to reconnect.
    Reconnect,
}

impl EventKind {
    /// Lower-case name used in the event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pass => "pass",
            Self::Overdue => "overdue",
            Self::Received => "received",
            Self::Reconnect => "reconnect",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped link event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkEvent {
    /// Wall-clock time of the event.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

impl LinkEvent {
    /// Create an event stamped with the current time.
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Render as one event-log line: `"<unix seconds> - <kind>"`.
    pub fn to_log_line(&self) -> String {
        format!("{} - {}", self.timestamp.timestamp(), self.kind)
    }
}

/// Consumer of link events.
///
/// Sinks must not fail the caller; write errors are logged and dropped.
pub trait EventSink: Send + Sync {
    /// Record one event.
    fn record(&self, event: &LinkEvent);
}

/// Append-only event log file, one line per event.
pub struct FileEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileEventLog {
    /// Open (creating if needed) an event log for appending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventLog {
    fn record(&self, event: &LinkEvent) {
        let mut file = self.file.lock();
        let written = writeln!(file, "{}", event.to_log_line()).and_then(|_| file.flush());

        if let Err(e) = written {
            warn!("Failed to write event log {}: {}", self.path.display(), e);
        }
    }
}

/// Sink that emits events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &LinkEvent) {
        info!(
            target: "hrs_watchdog::events",
            kind = %event.kind,
            ts = event.timestamp.timestamp(),
            "link event"
        );
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LinkEvent>>,
}

impl MemoryEventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().clone()
    }

    /// Kinds of all recorded events, oldest first.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Number of recorded events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, event: &LinkEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Fan-out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl MultiSink {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: std::sync::Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for MultiSink {
    fn record(&self, event: &LinkEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_log_line_format() {
        let event = LinkEvent {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            kind: EventKind::Overdue,
        };
        assert_eq!(event.to_log_line(), "1700000000 - overdue");
    }

    #[test]
    fn test_file_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bluetooth.log");

        let log = FileEventLog::open(&path).unwrap();
        log.record(&LinkEvent::now(EventKind::Start));
        log.record(&LinkEvent::now(EventKind::Received));
        drop(log);

        // Reopening must not truncate.
        let log = FileEventLog::open(&path).unwrap();
        log.record(&LinkEvent::now(EventKind::Reconnect));

        let contents = std::fs::read_to_string(&path).unwrap();
        let kinds: Vec<&str> = contents
            .lines()
            .map(|line| line.split(" - ").nth(1).unwrap())
            .collect();
        assert_eq!(kinds, vec!["start", "received", "reconnect"]);
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("bluetooth.log");
        assert!(matches!(
            FileEventLog::open(path),
            Err(crate::Error::Io(_))
        ));
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let a = Arc::new(MemoryEventLog::new());
        let b = Arc::new(MemoryEventLog::new());
        let sink = MultiSink::new().with(a.clone()).with(b.clone());

        sink.record(&LinkEvent::now(EventKind::Pass));

        assert_eq!(a.kinds(), vec![EventKind::Pass]);
        assert_eq!(b.count(EventKind::Pass), 1);
    }
}
