//! Terminal dashboard for a GlucoPatch session.
//!
//! One session drives the whole screen. The event loop:
//!
//! - sets up and restores the terminal
//! - starts a connect in the background and collects its result
//! - mirrors session events into [`App`] and redraws every poll interval
//!
//! Connecting happens once at start-up and again whenever `c` is pressed.
//! There is no automatic reconnect.

pub mod app;
pub mod chart;
pub mod errors;
pub mod input;
pub mod ui;

pub use app::App;
pub use chart::ChartSurface;

use std::io::{self, stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use glucopatch_core::{
    AxisFloors, BleTransport, ByIdentifier, ConnectionState, DiscoveredDevice, Error,
    EventReceiver, FirstMatch, MockTransport, Session, Transport,
};
use ratatui::prelude::*;
use time::UtcOffset;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::DEMO_INTERVAL;
use crate::config::{Config, DiscoveryOverrides, resolve_device};
use input::Request;

/// How long to wait for a key before redrawing.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type ConnectTask = JoinHandle<glucopatch_core::Result<DiscoveredDevice>>;

/// Set up the terminal for TUI rendering.
///
/// Enables raw mode and switches to the alternate screen buffer.
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to its original state.
pub fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

/// Run the dashboard until the user quits.
///
/// `device` picks a patch by identifier or name; the config file's default
/// device is used when it is `None`. With `demo`, readings come from a
/// simulated patch instead of Bluetooth. Timestamps are shown at
/// `clock_offset`.
pub async fn run(
    config: &Config,
    device: Option<String>,
    demo: bool,
    clock_offset: UtcOffset,
) -> Result<()> {
    let session_config = config
        .session_config(&DiscoveryOverrides::default())?
        .clock_offset(clock_offset);
    let floors = config.axis_floors();
    let device = resolve_device(device, config);

    if demo {
        let transport = Arc::new(MockTransport::demo(DEMO_INTERVAL));
        run_session(Session::new(transport, session_config), floors, device, true).await
    } else {
        let transport = Arc::new(BleTransport::new());
        run_session(Session::new(transport, session_config), floors, device, false).await
    }
}

async fn run_session<T: Transport>(
    session: Session<T>,
    floors: AxisFloors,
    device: Option<String>,
    demo: bool,
) -> Result<()> {
    let session = Arc::new(session);
    let mut app = App::new(
        Arc::clone(session.store()),
        Arc::clone(session.log()),
        floors,
        demo,
    );
    let mut events = session.subscribe();

    let mut terminal = setup_terminal()?;
    info!(demo, "Dashboard started");

    let mut connecting = Some(spawn_connect(&session, device.clone()));
    let result = run_event_loop(
        &mut terminal,
        &mut app,
        &session,
        &mut events,
        &mut connecting,
        device.as_deref(),
    )
    .await;

    if let Some(task) = connecting.take() {
        task.abort();
    }
    if let Err(e) = session.disconnect().await {
        debug!(error = %e, "Disconnect on exit failed");
    }

    restore_terminal()?;
    result
}

/// Start a connect on its own task.
fn spawn_connect<T: Transport>(session: &Arc<Session<T>>, device: Option<String>) -> ConnectTask {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        match device {
            Some(identifier) => session.connect(&ByIdentifier(identifier)).await,
            None => session.connect(&FirstMatch).await,
        }
    })
}

/// Main event loop for the TUI.
async fn run_event_loop<T: Transport>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    session: &Arc<Session<T>>,
    events: &mut EventReceiver,
    connecting: &mut Option<ConnectTask>,
    device: Option<&str>,
) -> Result<()> {
    while !app.should_quit() {
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(POLL_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let action = input::handle_key(key.code, key.modifiers);
            match input::apply_action(app, action) {
                Some(Request::Connect) if connecting.is_some() => {
                    app.show_error(&Error::Busy(ConnectionState::Connecting));
                }
                Some(Request::Connect) => {
                    *connecting = Some(spawn_connect(session, device.map(str::to_string)));
                }
                Some(Request::Disconnect) => {
                    if let Err(e) = session.disconnect().await {
                        app.show_error(&e);
                    }
                }
                None => {}
            }
        }

        drain_events(app, session, events);

        if connecting.as_ref().is_some_and(JoinHandle::is_finished)
            && let Some(task) = connecting.take()
        {
            match task.await {
                Ok(result) => app.connect_finished(result),
                Err(e) => debug!(error = %e, "Connect task ended without a result"),
            }
        }
    }

    Ok(())
}

/// Apply every queued session event to the app.
fn drain_events<T: Transport>(app: &mut App, session: &Session<T>, events: &mut EventReceiver) {
    loop {
        match events.try_recv() {
            Ok(event) => app.handle_session_event(event),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Dashboard fell behind on session events");
                app.state = session.state();
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
