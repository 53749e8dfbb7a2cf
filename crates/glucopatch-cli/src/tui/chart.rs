//! Chart drawing for the dashboard.
//!
//! [`ChartSurface`] owns at most one built [`ChartPair`]. It rebuilds only
//! when the reading store reports a new version, and the previous pair is
//! released before the next snapshot is projected.

use glucopatch_core::{AxisFloors, ChartModel, ChartPair, ChartShape, Metric, ReadingStore};
use ratatui::prelude::*;
use ratatui::symbols;
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::ui::colors;
use super::ui::theme::{AppTheme, BORDER_TYPE};

/// Owns the built charts for the dashboard.
#[derive(Debug)]
pub struct ChartSurface {
    floors: AxisFloors,
    /// Offset for the time axis labels.
    offset: UtcOffset,
    pair: Option<ChartPair>,
    builds: u64,
}

impl ChartSurface {
    pub fn new(floors: AxisFloors, offset: UtcOffset) -> Self {
        Self {
            floors,
            offset,
            pair: None,
            builds: 0,
        }
    }

    /// Rebuild from `store` if it changed since the last build.
    ///
    /// Returns `true` when a new pair was built.
    pub fn refresh(&mut self, store: &ReadingStore) -> bool {
        let version = store.version();
        if self.pair.as_ref().is_some_and(|pair| pair.version == version) {
            return false;
        }

        self.pair = None;
        let snapshot = store.snapshot();
        self.pair = Some(ChartPair::build(&snapshot, self.floors, version));
        self.builds += 1;
        true
    }

    /// The current pair, if one has been built.
    pub fn pair(&self) -> Option<&ChartPair> {
        self.pair.as_ref()
    }

    pub fn model(&self, metric: Metric) -> Option<&ChartModel> {
        self.pair.as_ref().map(|pair| pair.get(metric))
    }

    /// Number of pairs built so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    /// Release the built pair.
    pub fn clear(&mut self) {
        self.pair = None;
    }

    /// Draw one metric's chart into `area`.
    pub fn render(&self, frame: &mut Frame, area: Rect, metric: Metric, theme: &AppTheme) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BORDER_TYPE)
            .border_style(theme.border_inactive_style());

        let Some(model) = self.model(metric) else {
            frame.render_widget(block.title(chart_title(metric, None)), area);
            return;
        };

        let color = match (metric, model.latest()) {
            (Metric::Glucose, Some(value)) => colors::glucose_band(value).1,
            (Metric::Temperature, Some(value)) => colors::temperature_color(value),
            (_, None) => theme.text_secondary,
        };

        let datasets = match model.shape() {
            ChartShape::Empty => Vec::new(),
            ChartShape::Marker => vec![
                Dataset::default()
                    .marker(symbols::Marker::Dot)
                    .graph_type(GraphType::Scatter)
                    .style(Style::default().fg(color))
                    .data(&model.points),
            ],
            ChartShape::Line => vec![
                Dataset::default()
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(color))
                    .data(&model.points),
            ],
        };

        let x_labels = match model.time_span() {
            Some((start, end)) => vec![clock_label(start, self.offset), clock_label(end, self.offset)],
            None => vec![String::new(), String::new()],
        };
        let axis_style = Style::default().fg(theme.text_muted);

        let chart = Chart::new(datasets)
            .block(block.title(Span::styled(
                chart_title(metric, model.latest()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )))
            .x_axis(
                Axis::default()
                    .bounds(model.x_bounds)
                    .labels(x_labels)
                    .style(axis_style),
            )
            .y_axis(
                Axis::default()
                    .bounds(model.y_bounds)
                    .labels(y_labels(model.y_bounds, metric))
                    .style(axis_style),
            );

        frame.render_widget(chart, area);
    }
}

fn chart_title(metric: Metric, latest: Option<f64>) -> String {
    match latest {
        Some(value) => format!(" {} ({}): {} ", metric.label(), metric.unit(), value),
        None => format!(" {} ({}) ", metric.label(), metric.unit()),
    }
}

/// Bottom, middle and top of the value axis.
fn y_labels(bounds: [f64; 2], metric: Metric) -> Vec<String> {
    let [lo, hi] = bounds;
    let mid = (lo + hi) / 2.0;
    match metric {
        Metric::Glucose => [lo, mid, hi].iter().map(|v| format!("{v:.0}")).collect(),
        Metric::Temperature => [lo, mid, hi].iter().map(|v| format!("{v:.1}")).collect(),
    }
}

/// Wall-clock `HH:MM:SS` for an instant at `offset`.
pub(crate) fn clock_label(at: OffsetDateTime, offset: UtcOffset) -> String {
    at.to_offset(offset)
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}
