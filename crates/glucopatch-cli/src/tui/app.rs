//! Application state for the dashboard.
//!
//! The app never talks to the transport. It mirrors session events it cares
//! about and reads the reading store and diagnostic log directly when
//! drawing.

use std::sync::Arc;

use glucopatch_core::{
    AxisFloors, ConnectionState, DiagnosticLog, DiscoveredDevice, Error, LogEntry, ReadingStore,
    SessionEvent,
};

use super::chart::ChartSurface;
use super::errors::format_error_with_guidance;
use super::ui::theme::AppTheme;

/// Headline and optional suggestion for the last failure.
pub type ErrorDisplay = (String, Option<String>);

pub struct App {
    pub store: Arc<ReadingStore>,
    pub log: Arc<DiagnosticLog>,
    pub charts: ChartSurface,
    pub theme: AppTheme,
    /// Readings come from the simulated patch.
    pub demo: bool,
    pub state: ConnectionState,
    /// The device of the current or last link.
    pub device: Option<DiscoveredDevice>,
    pub decode_failures: u64,
    pub error: Option<ErrorDisplay>,
    /// Log entries hidden below the panel; 0 follows the newest entry.
    pub log_scroll: usize,
    should_quit: bool,
}

impl App {
    pub fn new(
        store: Arc<ReadingStore>,
        log: Arc<DiagnosticLog>,
        floors: AxisFloors,
        demo: bool,
    ) -> Self {
        let charts = ChartSurface::new(floors, log.offset());
        Self {
            store,
            log,
            charts,
            theme: AppTheme::default(),
            demo,
            state: ConnectionState::Disconnected,
            device: None,
            decode_failures: 0,
            error: None,
            log_scroll: 0,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Per-frame update: rebuild charts if the store moved on.
    pub fn tick(&mut self) {
        self.charts.refresh(&self.store);
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged { state } => self.state = state,
            SessionEvent::DecodeFailed { .. } => self.decode_failures += 1,
            SessionEvent::Log { .. } => {
                // Keep a scrolled-back view anchored on the same entries.
                if self.log_scroll > 0 {
                    self.log_scroll += 1;
                }
            }
            _ => {}
        }
    }

    /// Record the outcome of a connect request.
    pub fn connect_finished(&mut self, result: Result<DiscoveredDevice, Error>) {
        match result {
            Ok(device) => {
                self.device = Some(device);
                self.error = None;
            }
            Err(err) => self.show_error(&err),
        }
    }

    pub fn show_error(&mut self, error: &Error) {
        self.error = Some(format_error_with_guidance(error));
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn scroll_log_up(&mut self, lines: usize) {
        let max = self.log.len().saturating_sub(1);
        self.log_scroll = self.log_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    pub fn follow_log(&mut self) {
        self.log_scroll = 0;
    }

    /// Up to `height` log entries ending `log_scroll` entries before the newest.
    pub fn visible_log(&self, height: usize) -> Vec<LogEntry> {
        let entries = self.log.tail(height.saturating_add(self.log_scroll));
        let end = entries.len().saturating_sub(self.log_scroll);
        let start = end.saturating_sub(height);
        entries[start..end].to_vec()
    }
}
