//! Offline fold of a recorded frame capture.

use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use client_core::{
    dispatch_event, InboundEvent, MetricsState, PlaceholderSource, SessionEffect, SessionState,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    protocol::{ChannelNamespace, EventFrame},
};
use tracing::debug;

/// One captured frame per line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFrame {
    pub namespace: ChannelNamespace,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the frame was observed; replay time is used when absent.
    #[serde(default)]
    pub observed_at_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReplayOutcome {
    pub frames: usize,
    pub session: SessionState,
    pub metrics: MetricsState,
    /// Effects the live client would have run; replay never performs them.
    pub skipped_effects: Vec<String>,
}

pub fn replay_capture(
    input: impl BufRead,
    user_id: Option<&UserId>,
    placeholder: &mut dyn PlaceholderSource,
) -> Result<ReplayOutcome> {
    let mut outcome = ReplayOutcome {
        frames: 0,
        session: SessionState::new(),
        metrics: MetricsState::new(),
        skipped_effects: Vec::new(),
    };

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read capture line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: CapturedFrame = serde_json::from_str(&line)
            .with_context(|| format!("invalid capture frame on line {line_no}"))?;
        let observed_at = observed_at(frame.observed_at_ms);
        let event = dispatch_event(
            frame.namespace,
            EventFrame {
                event: frame.event,
                data: frame.data,
            },
        );
        debug!(line = line_no, event = event.name(), "replay: folding frame");
        outcome.frames += 1;

        match event {
            InboundEvent::Session(event) => {
                for effect in outcome.session.apply(event, user_id) {
                    outcome.skipped_effects.push(describe_effect(&effect));
                }
            }
            InboundEvent::Dashboard(event) => {
                outcome.metrics.apply(&event, observed_at, placeholder);
            }
        }
    }

    Ok(outcome)
}

fn observed_at(ms: Option<i64>) -> DateTime<Utc> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

fn describe_effect(effect: &SessionEffect) -> String {
    match effect {
        SessionEffect::SendUserMessage { user_id, .. } => match user_id {
            Some(user_id) => format!("send_user_message as {user_id}"),
            None => "send_user_message (unregistered)".to_string(),
        },
        SessionEffect::FetchValenceHistory { user_id } => {
            format!("fetch_valence_history for {user_id}")
        }
    }
}

pub fn render_text(outcome: &ReplayOutcome) -> String {
    let mut out = vec![format!("frames: {}", outcome.frames), "transcript:".to_string()];
    for entry in outcome.session.entries() {
        let speaker = entry
            .agent
            .clone()
            .unwrap_or_else(|| format!("{:?}", entry.role).to_lowercase());
        out.push(format!("  {speaker}> {}", entry.content));
    }
    if !outcome.session.valence_history().is_empty() {
        out.push(format!(
            "valence history: {:?}",
            outcome.session.valence_history()
        ));
    }

    let metrics = &outcome.metrics;
    out.push(format!(
        "dashboard: {} points, leader {}, {} ticks",
        metrics.confidence().len(),
        metrics.leading_route().display_name(),
        metrics.confidence_ticks().len()
    ));
    for row in metrics.transport_comparison() {
        let marker = if row.synthetic { " (synthetic)" } else { "" };
        out.push(format!(
            "  {} grpc={:.1}ms rest={:.1}ms{marker}",
            row.label, row.grpc, row.rest
        ));
    }
    for effect in &outcome.skipped_effects {
        out.push(format!("skipped effect: {effect}"));
    }
    out.join("\n")
}

#[cfg(test)]
#[path = "tests/replay_tests.rs"]
mod tests;
