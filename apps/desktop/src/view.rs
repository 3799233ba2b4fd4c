//! Terminal rendering of published deltas.

use client_core::{metrics::MetricPoint, MetricsDelta, Provenance, SessionDelta, TranscriptEntry};
use shared::domain::Role;

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Starts a new line.
    Line(String),
    /// Continues the last streamed line.
    Append(String),
}

/// Streamed text is appended in place, so only new entries start a line.
pub fn render(delta: &SessionDelta) -> Option<Output> {
    match delta {
        SessionDelta::EntryAppended { entry, .. } => Some(Output::Line(entry_line(entry))),
        SessionDelta::TextChunk { delta, .. } => Some(Output::Append(delta.clone())),
        SessionDelta::AwaitingResponse { .. } => None,
        SessionDelta::ValenceHistory { history } => {
            let samples: Vec<String> = history.iter().map(|v| format!("{v:.2}")).collect();
            Some(Output::Line(format!(
                "valence history: [{}]",
                samples.join(", ")
            )))
        }
    }
}

fn entry_line(entry: &TranscriptEntry) -> String {
    let speaker = match entry.role {
        Role::User => "you",
        Role::System => entry.agent.as_deref().unwrap_or("system"),
    };
    match &entry.mental_model {
        Some(model) => format!("{speaker}> {} [{model}]", entry.content),
        None => format!("{speaker}> {}", entry.content),
    }
}

/// One-line summary of the newest dashboard point.
pub fn metrics_summary(metrics: &MetricsDelta) -> String {
    let step = &metrics.step;
    let mut parts = vec![format!("[{}]", step.label)];
    if let Some(name) = &step.step {
        parts.push(format!("step={name}"));
    }
    if let Some(status) = &step.status {
        parts.push(format!("status={status}"));
    }
    if let Some(valence) = metrics.valence.value {
        parts.push(format!("valence={valence:.2}"));
    }
    if let Some(latency) = metrics.latency.value {
        parts.push(format!("latency={latency:.0}ms"));
    }
    parts.push(format!("leader={}", metrics.leading_route.display_name()));
    parts.push(transport_part("grpc", &metrics.grpc_latency));
    parts.push(transport_part("rest", &metrics.rest_latency));
    parts.join(" ")
}

// Synthetic values carry a `~` marker.
fn transport_part(name: &str, point: &MetricPoint) -> String {
    let marker = match point.provenance {
        Provenance::Synthetic => "~",
        Provenance::Measured => "",
    };
    match point.value {
        Some(value) => format!("{name}={marker}{value:.1}ms"),
        None => format!("{name}=-"),
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
