//! Chart projection for reading history.
//!
//! Turns a store snapshot into plot-ready points and axis bounds, one chart
//! per [`Metric`]. Drawing is left to the front end; this module only does
//! the arithmetic so it can be tested without a terminal.

use time::OffsetDateTime;

use glucopatch_types::Reading;

/// Default upper bound of the glucose axis, in mg/dL.
pub const GLUCOSE_AXIS_FLOOR: f64 = 200.0;

/// Default upper bound of the temperature axis, in °C.
pub const TEMPERATURE_AXIS_FLOOR: f64 = 40.0;

/// Half-width of the time axis around a single point, in seconds.
const SINGLE_POINT_SPAN_SECS: f64 = 30.0;

/// A plotted quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Glucose,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Glucose, Metric::Temperature];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Glucose => "Glucose",
            Metric::Temperature => "Temperature",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Glucose => "mg/dL",
            Metric::Temperature => "°C",
        }
    }

    /// Axis floor used when none is configured.
    pub fn default_floor(self) -> f64 {
        match self {
            Metric::Glucose => GLUCOSE_AXIS_FLOOR,
            Metric::Temperature => TEMPERATURE_AXIS_FLOOR,
        }
    }

    pub fn value(self, reading: &Reading) -> f64 {
        match self {
            Metric::Glucose => reading.glucose_mg_dl,
            Metric::Temperature => reading.temperature_c,
        }
    }
}

/// Axis floors per metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisFloors {
    pub glucose: f64,
    pub temperature: f64,
}

impl Default for AxisFloors {
    fn default() -> Self {
        Self {
            glucose: GLUCOSE_AXIS_FLOOR,
            temperature: TEMPERATURE_AXIS_FLOOR,
        }
    }
}

impl AxisFloors {
    pub fn for_metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Glucose => self.glucose,
            Metric::Temperature => self.temperature,
        }
    }
}

/// Upper axis bound: the larger of the observed maximum and `floor`.
///
/// ```
/// use glucopatch_core::chart::axis_max;
///
/// assert_eq!(axis_max([50.0, 90.0, 310.0], 200.0), 310.0);
/// assert_eq!(axis_max([50.0, 90.0], 200.0), 200.0);
/// assert_eq!(axis_max([], 40.0), 40.0);
/// ```
pub fn axis_max(values: impl IntoIterator<Item = f64>, floor: f64) -> f64 {
    values.into_iter().fold(floor, f64::max)
}

/// How a projected series should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartShape {
    /// No points: axes only.
    Empty,
    /// One point: a marker, no line.
    Marker,
    /// Two or more points joined by straight segments.
    Line,
}

/// One metric projected onto plot coordinates.
///
/// `x` is seconds since the Unix epoch of [`Reading::plot_time`]; `y` is
/// the metric value. Points keep arrival order, so the most recent reading
/// is always last.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartModel {
    pub metric: Metric,
    pub points: Vec<(f64, f64)>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl ChartModel {
    /// Project `readings` (in arrival order) for `metric`.
    pub fn project(readings: &[Reading], metric: Metric, floor: f64) -> Self {
        let points: Vec<(f64, f64)> = readings
            .iter()
            .map(|r| (unix_seconds(r.plot_time()), metric.value(r)))
            .collect();

        let y_max = axis_max(points.iter().map(|&(_, y)| y), floor);
        let y_min = points.iter().map(|&(_, y)| y).fold(0.0, f64::min);

        Self {
            metric,
            x_bounds: x_bounds(&points),
            y_bounds: [y_min, y_max],
            points,
        }
    }

    pub fn shape(&self) -> ChartShape {
        match self.points.len() {
            0 => ChartShape::Empty,
            1 => ChartShape::Marker,
            _ => ChartShape::Line,
        }
    }

    /// The most recent value.
    pub fn latest(&self) -> Option<f64> {
        self.points.last().map(|&(_, y)| y)
    }

    /// The time-axis bounds as instants, for labelling. `None` when empty.
    pub fn time_span(&self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        if self.points.is_empty() {
            return None;
        }
        Some((from_unix_seconds(self.x_bounds[0])?, from_unix_seconds(self.x_bounds[1])?))
    }
}

/// Both charts built from one store snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPair {
    /// Store version the pair was built from.
    pub version: u64,
    pub glucose: ChartModel,
    pub temperature: ChartModel,
}

impl ChartPair {
    pub fn build(readings: &[Reading], floors: AxisFloors, version: u64) -> Self {
        Self {
            version,
            glucose: ChartModel::project(readings, Metric::Glucose, floors.glucose),
            temperature: ChartModel::project(readings, Metric::Temperature, floors.temperature),
        }
    }

    pub fn get(&self, metric: Metric) -> &ChartModel {
        match metric {
            Metric::Glucose => &self.glucose,
            Metric::Temperature => &self.temperature,
        }
    }
}

fn unix_seconds(t: OffsetDateTime) -> f64 {
    t.unix_timestamp_nanos() as f64 / 1e9
}

fn from_unix_seconds(secs: f64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).ok()
}

fn x_bounds(points: &[(f64, f64)]) -> [f64; 2] {
    let Some(&(first, _)) = points.first() else {
        return [0.0, 1.0];
    };
    let (min, max) = points
        .iter()
        .fold((first, first), |(lo, hi), &(x, _)| (lo.min(x), hi.max(x)));
    if max - min < f64::EPSILON {
        [min - SINGLE_POINT_SPAN_SECS, max + SINGLE_POINT_SPAN_SECS]
    } else {
        [min, max]
    }
}
