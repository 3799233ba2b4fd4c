use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROCESSING_FAILURE_NOTICE: &str = "❌ Failed to process your message. Please try again.";
pub const DELIVERY_FAILURE_NOTICE: &str = "❌ Failed to register or send message.";

/// Failure classes surfaced to the transcript. All of them are turn-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Channel,
    Stream,
    Registration,
    UpstreamCall,
}

impl ErrorCode {
    pub fn notice(self) -> &'static str {
        match self {
            ErrorCode::Channel | ErrorCode::Stream => PROCESSING_FAILURE_NOTICE,
            ErrorCode::Registration | ErrorCode::UpstreamCall => DELIVERY_FAILURE_NOTICE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct TurnError {
    pub code: ErrorCode,
    pub message: String,
}

impl TurnError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Registration, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamCall, message)
    }

    pub fn notice(&self) -> &'static str {
        self.code.notice()
    }
}
