//! Single fold queue shared by both namespaces.
//!
//! Every inbound frame, local submission and effect result goes through one
//! mpsc queue and is folded to completion before the next one is taken.
//! Effects produced by a fold are handed to a separate worker afterwards; the
//! worker is the only writer of the outbound channel and reports its results
//! back through the same queue.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::UserId,
    error::TurnError,
    protocol::{OutboundEvent, UserMessagePayload},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    delta::{MetricsDelta, SessionDelta, SessionMark},
    dispatch::InboundEvent,
    error::RuntimeClosed,
    metrics::{MetricsState, PlaceholderSource, RandomPlaceholder},
    session::{SessionEffect, SessionEvent, SessionState},
    BackendApi, ClientEvent, OutboundChannel,
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 3;
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub history_limit: u32,
    /// Identifier from a previous registration, if any.
    pub user_id: Option<UserId>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            user_id: None,
        }
    }
}

#[derive(Debug)]
enum Envelope {
    Inbound(InboundEvent),
    IdentityAssigned(UserId),
    /// Fetches are numbered in the order their replies were folded.
    HistoryLoaded { seq: u64, history: Vec<f64> },
}

/// Cloneable entry point into the fold queue.
#[derive(Clone)]
pub struct RuntimeHandle {
    queue: mpsc::UnboundedSender<Envelope>,
    events: broadcast::Sender<ClientEvent>,
}

impl RuntimeHandle {
    pub fn deliver(&self, event: InboundEvent) -> Result<(), RuntimeClosed> {
        self.queue
            .send(Envelope::Inbound(event))
            .map_err(|_| RuntimeClosed)
    }

    pub fn submit(&self, text: impl Into<String>) -> Result<(), RuntimeClosed> {
        self.deliver(InboundEvent::Session(SessionEvent::UserMessageSubmitted {
            text: text.into(),
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

/// Final state returned once every handle is dropped and the queue drains.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub session: SessionState,
    pub metrics: MetricsState,
    pub user_id: Option<UserId>,
}

pub struct SessionRuntime {
    handle: RuntimeHandle,
    task: JoinHandle<RuntimeSnapshot>,
}

impl SessionRuntime {
    pub fn spawn(
        config: RuntimeConfig,
        backend: Arc<dyn BackendApi>,
        outbound: Arc<dyn OutboundChannel>,
    ) -> Self {
        Self::spawn_with_placeholder(config, backend, outbound, Box::new(RandomPlaceholder))
    }

    pub fn spawn_with_placeholder(
        config: RuntimeConfig,
        backend: Arc<dyn BackendApi>,
        outbound: Arc<dyn OutboundChannel>,
        placeholder: Box<dyn PlaceholderSource>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let worker = EffectWorker {
            backend,
            outbound,
            queue: queue_tx.downgrade(),
            history_limit: config.history_limit,
            registered: config.user_id.clone(),
            history_seq: 0,
        };
        tokio::spawn(worker.run(effects_rx));

        let folds = FoldLoop {
            session: SessionState::new(),
            metrics: MetricsState::new(),
            user_id: config.user_id,
            history_seq: 0,
            placeholder,
            effects: effects_tx,
            events: events.clone(),
        };
        let task = tokio::spawn(folds.run(queue_rx));

        Self {
            handle: RuntimeHandle {
                queue: queue_tx,
                events,
            },
            task,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Drops this runtime's own handle and waits until all other handles are
    /// gone and the queue is drained.
    pub async fn join(self) -> anyhow::Result<RuntimeSnapshot> {
        let Self { handle, task } = self;
        drop(handle);
        Ok(task.await?)
    }
}

struct FoldLoop {
    session: SessionState,
    metrics: MetricsState,
    user_id: Option<UserId>,
    /// Newest history fetch applied so far.
    history_seq: u64,
    placeholder: Box<dyn PlaceholderSource>,
    effects: mpsc::UnboundedSender<SessionEffect>,
    events: broadcast::Sender<ClientEvent>,
}

impl FoldLoop {
    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Envelope>) -> RuntimeSnapshot {
        while let Some(envelope) = queue.recv().await {
            self.fold(envelope);
        }
        debug!("runtime: fold queue closed");
        RuntimeSnapshot {
            session: self.session,
            metrics: self.metrics,
            user_id: self.user_id,
        }
    }

    fn fold(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Inbound(InboundEvent::Session(event)) => self.fold_session(event),
            Envelope::Inbound(InboundEvent::Dashboard(event)) => {
                self.metrics
                    .apply(&event, Utc::now(), self.placeholder.as_mut());
                if let Some(delta) = MetricsDelta::latest(&self.metrics) {
                    let _ = self.events.send(ClientEvent::Metrics(Box::new(delta)));
                }
            }
            Envelope::HistoryLoaded { seq, history } => {
                if seq <= self.history_seq {
                    debug!(
                        seq,
                        newest = self.history_seq,
                        "runtime: dropping stale valence history"
                    );
                    return;
                }
                self.history_seq = seq;
                self.fold_session(SessionEvent::ValenceHistoryLoaded { history });
            }
            Envelope::IdentityAssigned(user_id) => {
                info!(%user_id, "runtime: session identity assigned");
                self.user_id = Some(user_id.clone());
                let _ = self.events.send(ClientEvent::IdentityAssigned(user_id));
            }
        }
    }

    fn fold_session(&mut self, event: SessionEvent) {
        let mark = SessionMark::of(&self.session);
        let history_replaced = matches!(event, SessionEvent::ValenceHistoryLoaded { .. });
        let effects = self.session.apply(event, self.user_id.as_ref());

        let mut deltas = mark.deltas_since(&self.session);
        if history_replaced {
            deltas.push(SessionDelta::ValenceHistory {
                history: self.session.valence_history().to_vec(),
            });
        }
        for delta in deltas {
            let _ = self.events.send(ClientEvent::Session(delta));
        }

        for effect in effects {
            if self.effects.send(effect).is_err() {
                warn!("runtime: effect worker is gone; dropping effect");
            }
        }
    }
}

struct EffectWorker {
    backend: Arc<dyn BackendApi>,
    outbound: Arc<dyn OutboundChannel>,
    queue: mpsc::WeakUnboundedSender<Envelope>,
    history_limit: u32,
    registered: Option<UserId>,
    history_seq: u64,
}

impl EffectWorker {
    async fn run(mut self, mut effects: mpsc::UnboundedReceiver<SessionEffect>) {
        while let Some(effect) = effects.recv().await {
            match effect {
                SessionEffect::SendUserMessage { user_id, message } => {
                    self.send_user_message(user_id, message).await;
                }
                SessionEffect::FetchValenceHistory { user_id } => {
                    self.spawn_history_fetch(user_id);
                }
            }
        }
    }

    async fn send_user_message(&mut self, user_id: Option<UserId>, message: String) {
        let user_id = match user_id.or_else(|| self.registered.clone()) {
            Some(user_id) => user_id,
            None => match self.backend.register().await {
                Ok(user_id) => {
                    self.registered = Some(user_id.clone());
                    requeue(&self.queue, Envelope::IdentityAssigned(user_id.clone()));
                    user_id
                }
                Err(err) => {
                    warn!(error = %err, "runtime: registration failed");
                    requeue(
                        &self.queue,
                        outbound_failed(TurnError::registration(err.to_string())),
                    );
                    return;
                }
            },
        };

        let event = OutboundEvent::UserMessage(UserMessagePayload {
            user_id: user_id.clone(),
            message,
        });
        match self.outbound.emit(event).await {
            Ok(()) => info!(%user_id, "runtime: emitted user_message"),
            Err(err) => {
                warn!(error = %err, "runtime: failed to emit user_message");
                requeue(
                    &self.queue,
                    outbound_failed(TurnError::upstream(err.to_string())),
                );
            }
        }
    }

    fn spawn_history_fetch(&mut self, user_id: UserId) {
        self.history_seq += 1;
        let seq = self.history_seq;
        let backend = Arc::clone(&self.backend);
        let queue = self.queue.clone();
        let limit = self.history_limit;
        tokio::spawn(async move {
            match backend.valence_history(&user_id, limit).await {
                Ok(history) => requeue(&queue, Envelope::HistoryLoaded { seq, history }),
                Err(err) => warn!(%user_id, error = %err, "runtime: valence history fetch failed"),
            }
        });
    }
}

fn outbound_failed(error: TurnError) -> Envelope {
    Envelope::Inbound(InboundEvent::Session(SessionEvent::OutboundFailed(error)))
}

fn requeue(queue: &mpsc::WeakUnboundedSender<Envelope>, envelope: Envelope) {
    match queue.upgrade() {
        Some(queue) => {
            if queue.send(envelope).is_err() {
                debug!("runtime: fold queue closed before effect result arrived");
            }
        }
        None => debug!("runtime: fold queue closed before effect result arrived"),
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
