use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{domain::UserId, protocol::OutboundEvent};

pub mod delta;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod metrics;
pub mod runtime;
pub mod session;
pub mod transport;

pub use delta::{MetricsDelta, SessionDelta};
pub use dispatch::{dispatch_event, dispatch_frame, InboundEvent};
pub use http::HttpBackendApi;
pub use metrics::{MetricsState, PlaceholderSource, Provenance, RandomPlaceholder};
pub use runtime::{RuntimeConfig, RuntimeHandle, RuntimeSnapshot, SessionRuntime};
pub use session::{SessionEffect, SessionEvent, SessionState, TranscriptEntry};

/// HTTP collaborator for identity and history. Failures are reported back to
/// the fold queue; they never mutate reducer state directly.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn register(&self) -> Result<UserId>;
    async fn valence_history(&self, user_id: &UserId, limit: u32) -> Result<Vec<f64>>;
}

pub struct MissingBackendApi;

#[async_trait]
impl BackendApi for MissingBackendApi {
    async fn register(&self) -> Result<UserId> {
        Err(anyhow!("backend api is unavailable"))
    }

    async fn valence_history(&self, user_id: &UserId, _limit: u32) -> Result<Vec<f64>> {
        Err(anyhow!(
            "backend api is unavailable for valence history of user {user_id}"
        ))
    }
}

/// Write half of the session channel. Only the effect worker writes to it.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn emit(&self, event: OutboundEvent) -> Result<()>;
}

pub struct MissingOutboundChannel;

#[async_trait]
impl OutboundChannel for MissingOutboundChannel {
    async fn emit(&self, _event: OutboundEvent) -> Result<()> {
        Err(anyhow!("session channel is not connected"))
    }
}

/// Changes published after every fold.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Session(SessionDelta),
    Metrics(Box<MetricsDelta>),
    IdentityAssigned(UserId),
}
