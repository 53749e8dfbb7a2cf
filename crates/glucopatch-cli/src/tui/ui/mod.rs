//! Layout and rendering for the dashboard.
//!
//! - **Header**: title, demo badge and the current time
//! - **Top row**: connection status (left) and latest reading (right)
//! - **Charts**: glucose and temperature history
//! - **Log**: the session's diagnostic log
//! - **Status bar**: key help, or the last error with its suggestion

pub mod colors;
pub mod theme;

use glucopatch_core::Metric;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use time::OffsetDateTime;

use super::app::App;
use super::chart::clock_label;
use colors::{glucose_band, level_color, state_color, temperature_color};
use theme::BORDER_TYPE;

/// Height of the log panel including borders.
const LOG_PANEL_HEIGHT: u16 = 9;

/// Draw the complete dashboard.
pub fn draw(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),                // Header bar
            Constraint::Length(6),                // Status and latest reading
            Constraint::Min(8),                   // Charts
            Constraint::Length(LOG_PANEL_HEIGHT), // Log
            Constraint::Length(1),                // Status bar
        ])
        .split(frame.area());

    draw_header(frame, rows[0], app);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);
    draw_status_panel(frame, top[0], app);
    draw_latest_panel(frame, top[1], app);

    // Side by side when there is room, stacked otherwise.
    let direction = if rows[2].width >= 100 {
        Direction::Horizontal
    } else {
        Direction::Vertical
    };
    let charts = Layout::default()
        .direction(direction)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);
    app.charts
        .render(frame, charts[0], Metric::Glucose, &app.theme);
    app.charts
        .render(frame, charts[1], Metric::Temperature, &app.theme);

    draw_log_panel(frame, rows[3], app);
    draw_status_bar(frame, rows[4], app);
}

fn panel<'a>(title: &'a str, app: &App) -> Block<'a> {
    Block::default()
        .title(Span::styled(title, app.theme.title_style()))
        .borders(Borders::ALL)
        .border_type(BORDER_TYPE)
        .border_style(app.theme.border_inactive_style())
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let mut spans = vec![Span::styled(" GlucoPatch Monitor ", theme.title_style())];
    if app.demo {
        spans.push(Span::styled(
            " DEMO ",
            Style::default()
                .fg(Color::Black)
                .bg(theme.warning)
                .add_modifier(Modifier::BOLD),
        ));
    }
    let left = Line::from(spans);
    let right = Line::from(Span::styled(
        format!("{} ", clock_label(OffsetDateTime::now_utc(), app.log.offset())),
        Style::default().fg(theme.text_secondary),
    ))
    .alignment(Alignment::Right);

    let header = Block::default().style(theme.header_style());
    frame.render_widget(header, area);
    frame.render_widget(Paragraph::new(left), area);
    frame.render_widget(Paragraph::new(right), area);
}

fn draw_status_panel(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let label =
        |text: &'static str| Span::styled(text, Style::default().fg(theme.text_secondary));

    let device = match &app.device {
        Some(device) => format!("{} ({})", device.display_name(), device.id),
        None => "none".to_string(),
    };
    let failures_style = if app.decode_failures > 0 {
        Style::default().fg(theme.warning)
    } else {
        Style::default().fg(theme.text_primary)
    };

    let lines = vec![
        Line::from(vec![
            label("State:    "),
            Span::styled(
                app.state.to_string(),
                Style::default()
                    .fg(state_color(app.state))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            label("Device:   "),
            Span::styled(device, Style::default().fg(theme.text_primary)),
        ]),
        Line::from(vec![
            label("Readings: "),
            Span::styled(
                app.store.len().to_string(),
                Style::default().fg(theme.text_primary),
            ),
        ]),
        Line::from(vec![
            label("Dropped:  "),
            Span::styled(app.decode_failures.to_string(), failures_style),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(panel(" Connection ", app)), area);
}

fn draw_latest_panel(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let block = panel(" Latest Reading ", app);

    let Some(reading) = app.store.latest() else {
        let hint = Paragraph::new(Line::from(Span::styled(
            "Waiting for the first reading...",
            Style::default().fg(theme.text_muted),
        )))
        .block(block);
        frame.render_widget(hint, area);
        return;
    };

    let (band, band_color) = glucose_band(reading.glucose_mg_dl);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{} mg/dL", reading.glucose_mg_dl),
                Style::default()
                    .fg(band_color)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(band, Style::default().fg(band_color)),
        ]),
        Line::from(Span::styled(
            format!("{} °C", reading.temperature_c),
            Style::default().fg(temperature_color(reading.temperature_c)),
        )),
        Line::from(Span::styled(
            format!("at {}", reading.timestamp),
            Style::default().fg(theme.text_secondary),
        )),
    ];
    if let Some(uptime) = &reading.uptime {
        lines.push(Line::from(Span::styled(
            format!("uptime {uptime}"),
            Style::default().fg(theme.text_muted),
        )));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_log_panel(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let height = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = app
        .visible_log(height)
        .into_iter()
        .map(|entry| {
            let color = level_color(entry.level);
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.time),
                    Style::default().fg(theme.text_muted),
                ),
                Span::styled(
                    format!("{:<5} ", entry.level.to_string()),
                    Style::default().fg(color),
                ),
                Span::styled(entry.message, Style::default().fg(color)),
            ])
        })
        .collect();

    let title = if app.log_scroll > 0 {
        format!(" Log (+{} newer) ", app.log_scroll)
    } else {
        " Log ".to_string()
    };
    let block = Block::default()
        .title(Span::styled(title, theme.title_style()))
        .borders(Borders::ALL)
        .border_type(BORDER_TYPE)
        .border_style(if app.log_scroll > 0 {
            theme.border_active_style()
        } else {
            theme.border_inactive_style()
        });

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;

    let line = match &app.error {
        Some((message, suggestion)) => {
            let mut spans = vec![Span::styled(
                format!(" ✗ {message}"),
                Style::default()
                    .fg(theme.danger)
                    .add_modifier(Modifier::BOLD),
            )];
            if let Some(suggestion) = suggestion {
                spans.push(Span::styled(
                    format!("  {suggestion}"),
                    Style::default().fg(theme.text_secondary),
                ));
            }
            Line::from(spans)
        }
        None => {
            let key = |k: &'static str| Span::styled(k, Style::default().fg(theme.success));
            let text = |t: &'static str| Span::styled(t, Style::default().fg(theme.text_muted));
            Line::from(vec![
                Span::raw(" "),
                key("c"),
                text(" connect  "),
                key("d"),
                text(" disconnect  "),
                key("↑↓"),
                text(" scroll log  "),
                key("q"),
                text(" quit"),
            ])
        }
    };

    frame.render_widget(Paragraph::new(line), area);
}
