//! Incremental updates published after each fold. Subscribers receive what
//! changed, never a copy of the whole state.

use serde::Serialize;
use shared::domain::Route;

use crate::{
    metrics::{ConfidencePoint, MetricPoint, MetricsState, ProcessingStep, TickSchedule},
    session::{SessionState, TranscriptEntry},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionDelta {
    EntryAppended { index: usize, entry: TranscriptEntry },
    /// Text concatenated onto the streamed entry at `index`.
    TextChunk { index: usize, delta: String },
    AwaitingResponse { awaiting: bool },
    ValenceHistory { history: Vec<f64> },
}

/// Shape of the transcript before a fold. Only the last entry can grow, so
/// its length is all that is needed to find appended text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMark {
    entries: usize,
    last_len: usize,
    awaiting: bool,
}

impl SessionMark {
    pub fn of(state: &SessionState) -> Self {
        Self {
            entries: state.entries().len(),
            last_len: state.entries().last().map_or(0, |entry| entry.content.len()),
            awaiting: state.awaiting_response(),
        }
    }

    /// Transcript changes since the mark. The valence history is reported by
    /// the caller because only the history event replaces it.
    pub fn deltas_since(&self, state: &SessionState) -> Vec<SessionDelta> {
        let mut deltas = Vec::new();
        let entries = state.entries();

        if let Some(index) = self.entries.checked_sub(1) {
            let grown = entries
                .get(index)
                .and_then(|entry| entry.content.get(self.last_len..))
                .filter(|suffix| !suffix.is_empty());
            if let Some(suffix) = grown {
                deltas.push(SessionDelta::TextChunk {
                    index,
                    delta: suffix.to_string(),
                });
            }
        }

        for (index, entry) in entries.iter().enumerate().skip(self.entries) {
            deltas.push(SessionDelta::EntryAppended {
                index,
                entry: entry.clone(),
            });
        }

        if state.awaiting_response() != self.awaiting {
            deltas.push(SessionDelta::AwaitingResponse {
                awaiting: state.awaiting_response(),
            });
        }
        deltas
    }
}

/// Newest point of every dashboard series plus the derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsDelta {
    pub step: ProcessingStep,
    pub valence: MetricPoint,
    pub latency: MetricPoint,
    pub confidence: ConfidencePoint,
    pub grpc_latency: MetricPoint,
    pub rest_latency: MetricPoint,
    pub leading_route: Route,
    pub confidence_ticks: TickSchedule,
}

impl MetricsDelta {
    /// `None` until the first dashboard event has been folded.
    pub fn latest(metrics: &MetricsState) -> Option<Self> {
        Some(Self {
            step: metrics.steps().last()?.clone(),
            valence: metrics.valence().last()?.clone(),
            latency: metrics.latency().last()?.clone(),
            confidence: metrics.confidence().last()?.clone(),
            grpc_latency: metrics.grpc_latency().last()?.clone(),
            rest_latency: metrics.rest_latency().last()?.clone(),
            leading_route: metrics.leading_route(),
            confidence_ticks: metrics.confidence_ticks(),
        })
    }
}

#[cfg(test)]
#[path = "tests/delta_tests.rs"]
mod tests;
