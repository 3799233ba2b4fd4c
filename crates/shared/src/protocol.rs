use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// Namespace a frame travels on. The session and dashboard streams are
/// independent sockets on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelNamespace {
    Session,
    Dashboard,
}

impl ChannelNamespace {
    pub fn path(self) -> &'static str {
        match self {
            ChannelNamespace::Session => "/ws",
            ChannelNamespace::Dashboard => "/dashboard",
        }
    }
}

pub mod event_names {
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const AGENT_STREAM: &str = "agent_stream";
    pub const AGENT_STREAM_COMPLETE: &str = "agent_stream_complete";
    pub const AGENT_STREAM_ERROR: &str = "agent_stream_error";
    pub const ERROR: &str = "error";
    pub const DASHBOARD_EVENT: &str = "dashboard_event";
    pub const USER_MESSAGE: &str = "user_message";
}

/// Wire envelope shared by every inbound frame: a named event and its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponsePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mental_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStreamPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mental_model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStreamErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pipeline telemetry pushed on the dashboard namespace. Every field is
/// optional; the client assigns display labels at fold time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<BTreeMap<String, Option<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_latency: Option<f64>,
    /// Upstream sample time in epoch milliseconds, used only to place the
    /// confidence point on the time axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    pub user_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    UserMessage(UserMessagePayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupUser {
    pub id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: SignupUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValenceHistoryQuery {
    pub user_id: UserId,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValenceHistoryResponse {
    #[serde(default)]
    pub history: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_user_message_uses_camel_case_user_id() {
        let event = OutboundEvent::UserMessage(UserMessagePayload {
            user_id: UserId::from("u-42"),
            message: "hello".to_string(),
        });
        let encoded = serde_json::to_value(&event).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({
                "event": "user_message",
                "data": { "userId": "u-42", "message": "hello" }
            })
        );
    }

    #[test]
    fn dashboard_event_accepts_null_confidence_values() {
        let event: DashboardEvent = serde_json::from_value(serde_json::json!({
            "step": "route",
            "confidence": { "growth_challenge": 0.4, "reflection_agent": null }
        }))
        .expect("decode");
        let confidence = event.confidence.expect("confidence");
        assert_eq!(confidence.get("growth_challenge"), Some(&Some(0.4)));
        assert_eq!(confidence.get("reflection_agent"), Some(&None));
        assert!(event.valence.is_none());
    }

    #[test]
    fn frame_without_data_defaults_to_null() {
        let frame: EventFrame =
            serde_json::from_str(r#"{"event":"agent_stream_complete"}"#).expect("decode");
        assert_eq!(frame.event, "agent_stream_complete");
        assert!(frame.data.is_null());
    }
}
