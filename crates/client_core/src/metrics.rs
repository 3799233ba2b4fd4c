//! Dashboard metrics reducer: append-only series plus derived leader and ticks.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use rand::Rng;
use serde::Serialize;
use shared::{domain::Route, protocol::DashboardEvent};
use tracing::debug;

pub const CONFIDENCE_TICK_STRIDE_MS: i64 = 15_000;
pub const GRPC_PLACEHOLDER_BOUND_MS: f64 = 100.0;
pub const REST_PLACEHOLDER_BOUND_MS: f64 = 150.0;
/// Deltas closer than this are treated as tied.
const DELTA_TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Measured,
    /// Display filler substituted for a missing measurement. Never telemetry.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub label: String,
    pub timestamp_ms: i64,
    pub value: Option<f64>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidencePoint {
    pub label: String,
    pub timestamp_ms: i64,
    /// Always holds the enumerated routes; extra upstream routes ride along.
    pub by_route: BTreeMap<String, Option<f64>>,
}

impl ConfidencePoint {
    pub fn route(&self, route: Route) -> Option<f64> {
        self.by_route.get(route.as_str()).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStep {
    pub label: String,
    pub timestamp_ms: i64,
    pub step: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportLatencyRow {
    pub label: String,
    pub grpc: f64,
    pub rest: f64,
    pub synthetic: bool,
}

/// Source of placeholder latencies for events that carry no measurement.
pub trait PlaceholderSource: Send {
    /// Returns a value in `[0, upper_bound)`.
    fn sample(&mut self, upper_bound: f64) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPlaceholder;

impl PlaceholderSource for RandomPlaceholder {
    fn sample(&mut self, upper_bound: f64) -> f64 {
        rand::thread_rng().gen_range(0.0..upper_bound)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsState {
    valence: Vec<MetricPoint>,
    latency: Vec<MetricPoint>,
    confidence: Vec<ConfidencePoint>,
    grpc_latency: Vec<MetricPoint>,
    rest_latency: Vec<MetricPoint>,
    leading_route: Route,
    confidence_ticks: TickSchedule,
    steps: Vec<ProcessingStep>,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valence(&self) -> &[MetricPoint] {
        &self.valence
    }

    pub fn latency(&self) -> &[MetricPoint] {
        &self.latency
    }

    pub fn confidence(&self) -> &[ConfidencePoint] {
        &self.confidence
    }

    pub fn grpc_latency(&self) -> &[MetricPoint] {
        &self.grpc_latency
    }

    pub fn rest_latency(&self) -> &[MetricPoint] {
        &self.rest_latency
    }

    pub fn leading_route(&self) -> Route {
        self.leading_route
    }

    pub fn confidence_ticks(&self) -> TickSchedule {
        self.confidence_ticks
    }

    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    /// Folds one dashboard event. Every series grows by exactly one point.
    pub fn apply(
        &mut self,
        event: &DashboardEvent,
        observed_at: DateTime<Utc>,
        placeholder: &mut dyn PlaceholderSource,
    ) {
        let label = display_label(observed_at);
        let timestamp_ms = observed_at.timestamp_millis();

        self.steps.push(ProcessingStep {
            label: label.clone(),
            timestamp_ms,
            step: event.step.clone(),
            status: event.status.clone(),
        });
        self.valence.push(measured(&label, timestamp_ms, event.valence));
        self.latency.push(measured(&label, timestamp_ms, event.latency));

        let mut by_route: BTreeMap<String, Option<f64>> = Route::ALL
            .iter()
            .map(|route| (route.as_str().to_string(), None))
            .collect();
        if let Some(raw) = &event.confidence {
            by_route.extend(raw.iter().map(|(route, value)| (route.clone(), *value)));
        }
        self.confidence.push(ConfidencePoint {
            label: label.clone(),
            timestamp_ms: event.timestamp_ms.unwrap_or(timestamp_ms),
            by_route,
        });

        self.grpc_latency.push(transport_point(
            &label,
            timestamp_ms,
            event.grpc_latency,
            GRPC_PLACEHOLDER_BOUND_MS,
            placeholder,
        ));
        self.rest_latency.push(transport_point(
            &label,
            timestamp_ms,
            event.rest_latency,
            REST_PLACEHOLDER_BOUND_MS,
            placeholder,
        ));

        self.leading_route = leading_route(&self.confidence, self.leading_route);
        self.confidence_ticks = confidence_ticks(&self.confidence);

        debug!(
            step = event.step.as_deref().unwrap_or("-"),
            points = self.confidence.len(),
            leading_route = %self.leading_route,
            "metrics: folded dashboard event"
        );
    }

    /// gRPC and REST latency paired by index for the comparison view.
    pub fn transport_comparison(&self) -> Vec<TransportLatencyRow> {
        self.grpc_latency
            .iter()
            .enumerate()
            .map(|(index, grpc)| {
                let rest = self.rest_latency.get(index);
                TransportLatencyRow {
                    label: grpc.label.clone(),
                    grpc: grpc.value.unwrap_or_default(),
                    rest: rest.and_then(|point| point.value).unwrap_or_default(),
                    synthetic: grpc.provenance == Provenance::Synthetic
                        || rest.is_some_and(|point| point.provenance == Provenance::Synthetic),
                }
            })
            .collect()
    }
}

fn display_label(observed_at: DateTime<Utc>) -> String {
    observed_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string()
}

fn measured(label: &str, timestamp_ms: i64, value: Option<f64>) -> MetricPoint {
    MetricPoint {
        label: label.to_string(),
        timestamp_ms,
        value,
        provenance: Provenance::Measured,
    }
}

fn transport_point(
    label: &str,
    timestamp_ms: i64,
    value: Option<f64>,
    upper_bound: f64,
    placeholder: &mut dyn PlaceholderSource,
) -> MetricPoint {
    match value {
        Some(value) => measured(label, timestamp_ms, Some(value)),
        None => MetricPoint {
            label: label.to_string(),
            timestamp_ms,
            value: Some(placeholder.sample(upper_bound)),
            provenance: Provenance::Synthetic,
        },
    }
}

/// Picks the route with the largest positive confidence gain between the
/// first and the last point of the whole sequence. Ties go to the earlier
/// route in [`Route::ALL`]. Returns `previous` when no route gained.
pub fn leading_route(points: &[ConfidencePoint], previous: Route) -> Route {
    let [first, .., last] = points else {
        return previous;
    };

    let mut best: Option<(Route, f64)> = None;
    for route in Route::ALL {
        let delta = last.route(route).unwrap_or(0.0) - first.route(route).unwrap_or(0.0);
        if delta <= 0.0 {
            continue;
        }
        match best {
            Some((_, best_delta)) if delta <= best_delta + DELTA_TIE_TOLERANCE => {}
            _ => best = Some((route, delta)),
        }
    }

    best.map(|(route, _)| route).unwrap_or(previous)
}

/// Axis ticks every [`CONFIDENCE_TICK_STRIDE_MS`] from `start` up to and
/// including `end`. Only the bounds are stored; ticks are produced on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSchedule {
    start: i64,
    end: i64,
    count: u64,
}

impl TickSchedule {
    pub fn spanning(start: i64, end: i64) -> Self {
        let span = i128::from(end) - i128::from(start);
        let count = if span < 0 {
            0
        } else {
            // span / stride + 1 is at most u64::MAX / stride + 1.
            (span / i128::from(CONFIDENCE_TICK_STRIDE_MS)) as u64 + 1
        };
        Self { start, end, count }
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: u64) -> Option<i64> {
        (index < self.count).then(|| tick_at(self.start, index))
    }

    pub fn first(&self) -> Option<i64> {
        self.get(0)
    }

    pub fn last(&self) -> Option<i64> {
        self.count.checked_sub(1).and_then(|index| self.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let Self { start, count, .. } = *self;
        (0..count).map(move |index| tick_at(start, index))
    }
}

// Every index below `count` lands on or before `end`, so the result fits.
fn tick_at(start: i64, index: u64) -> i64 {
    (i128::from(start) + i128::from(index) * i128::from(CONFIDENCE_TICK_STRIDE_MS)) as i64
}

/// Tick schedule spanning the first and last confidence timestamps. Empty
/// below two points.
pub fn confidence_ticks(points: &[ConfidencePoint]) -> TickSchedule {
    let [first, .., last] = points else {
        return TickSchedule::default();
    };
    TickSchedule::spanning(first.timestamp_ms, last.timestamp_ms)
}

#[cfg(test)]
#[path = "tests/metrics_tests.rs"]
mod tests;
