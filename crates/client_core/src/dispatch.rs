//! Typed boundary between raw channel frames and the reducers.

use shared::protocol::{
    event_names, AgentResponsePayload, AgentStreamPayload, ChannelNamespace, DashboardEvent,
    EventFrame,
};
use thiserror::Error;
use tracing::warn;

use crate::session::SessionEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Session(SessionEvent),
    Dashboard(DashboardEvent),
}

impl InboundEvent {
    pub fn channel_error(reason: impl Into<String>) -> Self {
        InboundEvent::Session(SessionEvent::ChannelError {
            reason: reason.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Session(event) => event.name(),
            InboundEvent::Dashboard(_) => event_names::DASHBOARD_EVENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("frame is not a valid event envelope: {0}")]
    InvalidFrame(#[from] serde_json::Error),
    #[error("unknown event '{event}' on {namespace:?} namespace")]
    UnknownEvent {
        namespace: ChannelNamespace,
        event: String,
    },
    #[error("malformed '{event}' payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes a text frame, coercing anything unrecognized to a channel error.
pub fn dispatch_frame(namespace: ChannelNamespace, raw: &str) -> InboundEvent {
    match decode_frame(namespace, raw) {
        Ok(event) => event,
        Err(err) => {
            warn!(?namespace, error = %err, "dispatch: coercing frame to channel error");
            InboundEvent::channel_error(err.to_string())
        }
    }
}

/// Same coercion as [`dispatch_frame`] for a frame that is already parsed.
pub fn dispatch_event(namespace: ChannelNamespace, frame: EventFrame) -> InboundEvent {
    decode_event(namespace, frame).unwrap_or_else(|err| {
        warn!(?namespace, error = %err, "dispatch: coercing event to channel error");
        InboundEvent::channel_error(err.to_string())
    })
}

pub fn decode_frame(namespace: ChannelNamespace, raw: &str) -> Result<InboundEvent, DispatchError> {
    let frame: EventFrame = serde_json::from_str(raw)?;
    decode_event(namespace, frame)
}

pub fn decode_event(
    namespace: ChannelNamespace,
    frame: EventFrame,
) -> Result<InboundEvent, DispatchError> {
    let EventFrame { event, data } = frame;
    let decoded = match (namespace, event.as_str()) {
        (ChannelNamespace::Session, event_names::AGENT_RESPONSE) => {
            SessionEvent::AgentResponse(payload::<AgentResponsePayload>(&event, data)?)
        }
        (ChannelNamespace::Session, event_names::AGENT_STREAM) => {
            SessionEvent::AgentStreamChunk(payload::<AgentStreamPayload>(&event, data)?)
        }
        (ChannelNamespace::Session, event_names::AGENT_STREAM_COMPLETE) => {
            SessionEvent::AgentStreamComplete
        }
        (ChannelNamespace::Session, event_names::AGENT_STREAM_ERROR) => {
            SessionEvent::AgentStreamError {
                error: describe_error(&data),
            }
        }
        (_, event_names::ERROR) => SessionEvent::ChannelError {
            reason: describe_error(&data).unwrap_or_else(|| "channel reported an error".into()),
        },
        (ChannelNamespace::Dashboard, event_names::DASHBOARD_EVENT) => {
            return Ok(InboundEvent::Dashboard(payload::<DashboardEvent>(
                &event, data,
            )?));
        }
        _ => return Err(DispatchError::UnknownEvent { namespace, event }),
    };
    Ok(InboundEvent::Session(decoded))
}

fn payload<T: serde::de::DeserializeOwned>(
    event: &str,
    data: serde_json::Value,
) -> Result<T, DispatchError> {
    serde_json::from_value(data).map_err(|source| DispatchError::MalformedPayload {
        event: event.to_string(),
        source,
    })
}

fn describe_error(data: &serde_json::Value) -> Option<String> {
    match data {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(fields) => fields
            .get("error")
            .or_else(|| fields.get("message"))
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or_else(|| Some(data.to_string())),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
