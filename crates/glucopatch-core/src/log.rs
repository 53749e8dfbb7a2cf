//! Session diagnostic log.
//!
//! Append-only, in insertion order, meant for people. Each entry is also
//! emitted as a `tracing` event at the matching level.

use std::sync::{PoisonError, RwLock};

use time::UtcOffset;
use tracing::{error, info, warn};

use glucopatch_types::{LogEntry, LogLevel};

/// The diagnostic log of one session.
///
/// Entry times are shown at a fixed UTC offset chosen up front. Asking the
/// platform for the local offset later is unreliable once other threads
/// run, so callers look it up at startup and hand it in.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: RwLock<Vec<LogEntry>>,
    offset: UtcOffset,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_offset(UtcOffset::UTC)
    }
}

impl DiagnosticLog {
    /// A log stamping entries in UTC.
    pub fn new() -> Self {
        Self::default()
    }

    /// A log stamping entries at `offset`.
    pub fn with_offset(offset: UtcOffset) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            offset,
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Append an entry stamped with the current time and return it.
    pub fn push(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::now(level, message, self.offset);
        match level {
            LogLevel::Info => info!(target: "glucopatch::session", "{}", entry.message),
            LogLevel::Warn => warn!(target: "glucopatch::session", "{}", entry.message),
            LogLevel::Error => error!(target: "glucopatch::session", "{}", entry.message),
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Error, message)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let log = DiagnosticLog::new();
        log.info("first");
        log.warn("second");
        log.error("third");

        let entries = log.entries();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[2].level, LogLevel::Error);
    }

    #[test]
    fn test_tail() {
        let log = DiagnosticLog::new();
        assert!(log.tail(5).is_empty());
        for i in 0..10 {
            log.info(format!("entry {i}"));
        }
        let tail = log.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].message, "entry 7");
        assert_eq!(tail[2].message, "entry 9");
        assert_eq!(log.tail(100).len(), 10);
    }

    #[test]
    fn test_entries_use_configured_offset() {
        let offset = UtcOffset::from_hms(-7, 0, 0).unwrap();
        let log = DiagnosticLog::with_offset(offset);
        assert_eq!(log.offset(), offset);
        assert_eq!(DiagnosticLog::new().offset(), UtcOffset::UTC);

        let hour = |at: time::OffsetDateTime| format!("{:02}", at.to_offset(offset).hour());
        let before = hour(time::OffsetDateTime::now_utc());
        let entry = log.info("stamped");
        let after = hour(time::OffsetDateTime::now_utc());
        let stamped = &entry.time[..2];
        assert!(stamped == before || stamped == after);
    }

    #[test]
    fn test_push_returns_entry() {
        let log = DiagnosticLog::new();
        let entry = log.info("hello");
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.time.len(), 8);
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }
}
