//! Conversation transcript reducer.
//!
//! Folds session-namespace events into an ordered, append-only transcript.
//! Streamed replies are tracked through an explicit `stream_target` so that
//! every logical reply owns exactly one system entry no matter how many
//! chunks arrive.

use serde::Serialize;
use shared::{
    domain::{Role, UserId},
    error::{ErrorCode, TurnError},
    protocol::{AgentResponsePayload, AgentStreamPayload},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mental_model: Option<String>,
}

impl TranscriptEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent: None,
            mental_model: None,
        }
    }

    pub fn system(
        content: impl Into<String>,
        agent: Option<String>,
        mental_model: Option<String>,
    ) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            agent,
            mental_model: mental_model.filter(|model| !model.is_empty()),
        }
    }

    fn notice(content: &str) -> Self {
        Self::system(content, None, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UserMessageSubmitted { text: String },
    AgentResponse(AgentResponsePayload),
    AgentStreamChunk(AgentStreamPayload),
    AgentStreamComplete,
    AgentStreamError { error: Option<String> },
    ChannelError { reason: String },
    /// Registration or outbound delivery failed in the shell.
    OutboundFailed(TurnError),
    ValenceHistoryLoaded { history: Vec<f64> },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::UserMessageSubmitted { .. } => "user_message_submitted",
            SessionEvent::AgentResponse(_) => "agent_response",
            SessionEvent::AgentStreamChunk(_) => "agent_stream",
            SessionEvent::AgentStreamComplete => "agent_stream_complete",
            SessionEvent::AgentStreamError { .. } => "agent_stream_error",
            SessionEvent::ChannelError { .. } => "channel_error",
            SessionEvent::OutboundFailed(_) => "outbound_failed",
            SessionEvent::ValenceHistoryLoaded { .. } => "valence_history_loaded",
        }
    }
}

/// Follow-up work requested by a fold. Effects run only after the fold that
/// produced them has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Emit `user_message` on the channel. A missing identifier means the
    /// shell must register a user first.
    SendUserMessage {
        user_id: Option<UserId>,
        message: String,
    },
    FetchValenceHistory {
        user_id: UserId,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    entries: Vec<TranscriptEntry>,
    awaiting_response: bool,
    stream_target: Option<usize>,
    valence_history: Vec<f64>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn stream_target(&self) -> Option<usize> {
        self.stream_target
    }

    pub fn valence_history(&self) -> &[f64] {
        &self.valence_history
    }

    /// Folds one event. `user_id` is the identifier currently known to the
    /// shell; it is only read, never stored.
    pub fn apply(&mut self, event: SessionEvent, user_id: Option<&UserId>) -> Vec<SessionEffect> {
        debug!(
            event = event.name(),
            entries = self.entries.len(),
            streaming = self.stream_target.is_some(),
            "session: folding event"
        );

        match event {
            SessionEvent::UserMessageSubmitted { text } => {
                if text.trim().is_empty() {
                    return Vec::new();
                }
                // A user turn interrupts any open stream; later chunks start a new reply.
                self.stream_target = None;
                self.entries.push(TranscriptEntry::user(text.clone()));
                self.awaiting_response = true;
                vec![SessionEffect::SendUserMessage {
                    user_id: user_id.cloned(),
                    message: text,
                }]
            }
            SessionEvent::AgentResponse(payload) => {
                let history_user = payload.user_id.clone().or_else(|| user_id.cloned());
                self.entries.push(TranscriptEntry::system(
                    payload.message,
                    payload.agent,
                    payload.mental_model,
                ));
                self.awaiting_response = false;
                self.stream_target = None;
                history_user
                    .map(|user_id| vec![SessionEffect::FetchValenceHistory { user_id }])
                    .unwrap_or_default()
            }
            SessionEvent::AgentStreamChunk(chunk) => {
                self.apply_chunk(chunk);
                Vec::new()
            }
            SessionEvent::AgentStreamComplete => {
                self.stream_target = None;
                self.awaiting_response = false;
                Vec::new()
            }
            SessionEvent::AgentStreamError { error } => {
                warn!(
                    error = error.as_deref().unwrap_or("unspecified"),
                    streaming = self.stream_target.is_some(),
                    "session: agent stream failed"
                );
                // Without an open stream this only settles the awaiting flag.
                if self.stream_target.is_some() {
                    self.push_notice(ErrorCode::Stream.notice());
                } else {
                    self.awaiting_response = false;
                }
                Vec::new()
            }
            SessionEvent::ChannelError { reason } => {
                warn!(%reason, "session: channel error");
                self.push_notice(ErrorCode::Channel.notice());
                Vec::new()
            }
            SessionEvent::OutboundFailed(error) => {
                warn!(%error, "session: outbound delivery failed");
                self.push_notice(error.notice());
                Vec::new()
            }
            SessionEvent::ValenceHistoryLoaded { history } => {
                self.valence_history = history;
                Vec::new()
            }
        }
    }

    fn apply_chunk(&mut self, chunk: AgentStreamPayload) {
        let target = self
            .stream_target
            .and_then(|index| self.entries.get_mut(index));
        match target {
            Some(entry) => entry.content.push_str(&chunk.message),
            None => {
                self.entries.push(TranscriptEntry::system(
                    chunk.message,
                    chunk.agent,
                    chunk.mental_model,
                ));
                self.stream_target = Some(self.entries.len() - 1);
            }
        }
    }

    fn push_notice(&mut self, notice: &str) {
        self.entries.push(TranscriptEntry::notice(notice));
        self.stream_target = None;
        self.awaiting_response = false;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
