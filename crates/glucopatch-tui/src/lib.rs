//! Terminal dashboard for GlucoPatch sensor patches.
//!
//! This crate provides a standalone binary wrapper around glucopatch-cli's
//! dashboard. The implementation lives in `glucopatch-cli` with the `tui`
//! feature enabled.
//!
//! For the TUI implementation, see [`glucopatch_cli::tui`].

pub use glucopatch_cli::tui;
