//! The decode, append and log path for incoming frames.
//!
//! A [`Session`](crate::Session) feeds every notification through its
//! recorder. Offline tools (replaying captured payloads) use a standalone
//! [`Recorder`] and get the same store, log and events without a transport.

use std::sync::Arc;

use time::UtcOffset;

use glucopatch_types::{DecodeError, LogEntry, LogLevel, Reading, decode};

use crate::events::{EventDispatcher, EventReceiver, SessionEvent};
use crate::log::DiagnosticLog;
use crate::store::ReadingStore;

/// Default capacity of the event broadcast.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Reading store, diagnostic log and event broadcast for one monitor run.
#[derive(Debug)]
pub struct Recorder {
    store: Arc<ReadingStore>,
    log: Arc<DiagnosticLog>,
    events: EventDispatcher,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(None, DEFAULT_EVENT_CAPACITY, UtcOffset::UTC)
    }
}

impl Recorder {
    /// Create an empty recorder.
    ///
    /// `max_readings` caps the store (`None` keeps everything); log entries
    /// are stamped at `clock_offset`.
    pub fn new(max_readings: Option<usize>, event_capacity: usize, clock_offset: UtcOffset) -> Self {
        Self {
            store: Arc::new(ReadingStore::with_retention(max_readings)),
            log: Arc::new(DiagnosticLog::with_offset(clock_offset)),
            events: EventDispatcher::new(event_capacity),
        }
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<DiagnosticLog> {
        &self.log
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Append a log entry and announce it.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = self.log.push(level, message);
        self.events.send(SessionEvent::Log {
            entry: entry.clone(),
        });
        entry
    }

    pub(crate) fn send(&self, event: SessionEvent) {
        self.events.send(event);
    }

    /// Decode one frame and, on success, append it to the store.
    ///
    /// Success and failure are both logged. A failure leaves the store
    /// untouched and keeps the raw text in the log.
    pub fn ingest_frame(&self, bytes: &[u8]) -> Result<Reading, DecodeError> {
        match decode(bytes) {
            Ok(reading) => {
                self.store.append(reading.clone());
                self.record(LogLevel::Info, format!("Received {reading}"));
                self.send(SessionEvent::ReadingAppended {
                    reading: reading.clone(),
                });
                Ok(reading)
            }
            Err(err) => {
                let raw = String::from_utf8_lossy(bytes).into_owned();
                self.record(
                    LogLevel::Warn,
                    format!("Invalid frame ({}): {raw}", err.kind()),
                );
                self.send(SessionEvent::DecodeFailed {
                    error: err.to_string(),
                    raw: Some(raw),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_frame_is_stored_and_logged() {
        let recorder = Recorder::default();
        let mut events = recorder.subscribe();

        let reading = recorder
            .ingest_frame(br#"{"glucose_mg_dL": 105, "temperature_C": 36.8}"#)
            .unwrap();
        assert_eq!(reading.glucose_mg_dl, 105.0);
        assert_eq!(recorder.store().len(), 1);

        let entries = recorder.log().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.starts_with("Received 105 mg/dL"));

        assert!(matches!(events.try_recv(), Ok(SessionEvent::Log { .. })));
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::ReadingAppended { .. })
        ));
    }

    #[test]
    fn test_invalid_frame_keeps_store_unchanged() {
        let recorder = Recorder::default();
        let mut events = recorder.subscribe();

        let err = recorder.ingest_frame(b"not json at all").unwrap_err();
        assert_eq!(err.kind(), "syntax");
        assert!(recorder.store().is_empty());

        let entries = recorder.log().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert!(entries[0].message.contains("not json at all"));

        let _log = events.try_recv().unwrap();
        match events.try_recv().unwrap() {
            SessionEvent::DecodeFailed { raw, .. } => {
                assert_eq!(raw.as_deref(), Some("not json at all"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_recorder_settings() {
        let offset = UtcOffset::from_hms(1, 0, 0).unwrap();
        let recorder = Recorder::new(Some(2), 4, offset);
        assert_eq!(recorder.store().max_readings(), Some(2));
        assert_eq!(recorder.log().offset(), offset);
    }
}
