//! Keyboard input handling for the TUI.
//!
//! # Key Bindings
//!
//! | Key             | Action               |
//! |-----------------|----------------------|
//! | `q` / `Ctrl+C`  | Quit                 |
//! | `c`             | Connect              |
//! | `d`             | Disconnect           |
//! | `↑` / `k`       | Scroll log up        |
//! | `↓` / `j`       | Scroll log down      |
//! | `Home` / `g`    | Oldest log entry     |
//! | `End` / `G`     | Follow newest entry  |
//! | `Esc`           | Dismiss error        |

use crossterm::event::{KeyCode, KeyModifiers};

use super::app::App;

/// User actions that can be triggered by keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Connect,
    Disconnect,
    ScrollUp,
    ScrollDown,
    ScrollTop,
    ScrollBottom,
    DismissError,
    None,
}

/// A session operation the event loop has to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Connect,
    Disconnect,
}

/// Map a key press to an action.
pub fn handle_key(code: KeyCode, modifiers: KeyModifiers) -> Action {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Action::Quit,
            _ => Action::None,
        };
    }

    match code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('c') => Action::Connect,
        KeyCode::Char('d') => Action::Disconnect,
        KeyCode::Up | KeyCode::Char('k') => Action::ScrollUp,
        KeyCode::Down | KeyCode::Char('j') => Action::ScrollDown,
        KeyCode::Home | KeyCode::Char('g') => Action::ScrollTop,
        KeyCode::End | KeyCode::Char('G') => Action::ScrollBottom,
        KeyCode::Esc => Action::DismissError,
        _ => Action::None,
    }
}

/// Apply an action to the app. Session operations are handed back.
pub fn apply_action(app: &mut App, action: Action) -> Option<Request> {
    match action {
        Action::Quit => {
            app.quit();
            None
        }
        Action::Connect => {
            app.dismiss_error();
            Some(Request::Connect)
        }
        Action::Disconnect => Some(Request::Disconnect),
        Action::ScrollUp => {
            app.scroll_log_up(1);
            None
        }
        Action::ScrollDown => {
            app.scroll_log_down(1);
            None
        }
        Action::ScrollTop => {
            app.scroll_log_up(usize::MAX);
            None
        }
        Action::ScrollBottom => {
            app.follow_log();
            None
        }
        Action::DismissError => {
            app.dismiss_error();
            None
        }
        Action::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glucopatch_core::{AxisFloors, DiagnosticLog, ReadingStore};

    fn app() -> App {
        App::new(
            Arc::new(ReadingStore::new()),
            Arc::new(DiagnosticLog::new()),
            AxisFloors::default(),
            false,
        )
    }

    #[test]
    fn test_key_mapping() {
        let none = KeyModifiers::NONE;
        assert_eq!(handle_key(KeyCode::Char('q'), none), Action::Quit);
        assert_eq!(handle_key(KeyCode::Char('c'), none), Action::Connect);
        assert_eq!(handle_key(KeyCode::Char('d'), none), Action::Disconnect);
        assert_eq!(handle_key(KeyCode::Up, none), Action::ScrollUp);
        assert_eq!(handle_key(KeyCode::Char('j'), none), Action::ScrollDown);
        assert_eq!(handle_key(KeyCode::Char('G'), none), Action::ScrollBottom);
        assert_eq!(handle_key(KeyCode::Esc, none), Action::DismissError);
        assert_eq!(handle_key(KeyCode::Char('x'), none), Action::None);
    }

    #[test]
    fn test_ctrl_c_quits_instead_of_connecting() {
        assert_eq!(
            handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Action::Quit
        );
        assert_eq!(
            handle_key(KeyCode::Char('d'), KeyModifiers::CONTROL),
            Action::None
        );
    }

    #[test]
    fn test_session_actions_become_requests() {
        let mut app = app();
        assert_eq!(apply_action(&mut app, Action::Connect), Some(Request::Connect));
        assert_eq!(
            apply_action(&mut app, Action::Disconnect),
            Some(Request::Disconnect)
        );
        assert_eq!(apply_action(&mut app, Action::ScrollUp), None);
        assert!(!app.should_quit());
        assert_eq!(apply_action(&mut app, Action::Quit), None);
        assert!(app.should_quit());
    }
}
