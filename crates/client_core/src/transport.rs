//! WebSocket shell around the reducers: frames in, `user_message` out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::protocol::{ChannelNamespace, OutboundEvent};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};
use url::Url;

use crate::{
    dispatch::{dispatch_frame, InboundEvent},
    error::TransportError,
    runtime::RuntimeHandle,
    OutboundChannel,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Maps an `http(s)` server URL to the websocket URL of a namespace.
pub fn channel_url(server_url: &str, namespace: ChannelNamespace) -> Result<Url, TransportError> {
    let mut url = Url::parse(server_url).map_err(|source| TransportError::InvalidUrl {
        url: server_url.to_string(),
        source,
    })?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(TransportError::UnsupportedScheme(server_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::UnsupportedScheme(server_url.to_string()))?;
    let path = format!(
        "{}{}",
        url.path().trim_end_matches('/'),
        namespace.path()
    );
    url.set_path(&path);
    Ok(url)
}

/// Write half of a connected namespace.
pub struct WsOutbound {
    namespace: ChannelNamespace,
    sink: Mutex<WsSink>,
}

#[async_trait]
impl OutboundChannel for WsOutbound {
    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        let text = serde_json::to_string(&event)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .with_context(|| format!("failed to send on {:?} channel", self.namespace))?;
        Ok(())
    }
}

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Read half of a connected namespace. Nothing is read until it is attached
/// to a runtime with [`ChannelReader::spawn`].
pub struct ChannelReader {
    namespace: ChannelNamespace,
    stream: WsReader,
}

impl ChannelReader {
    /// Pumps every text frame into the fold queue until the socket closes or
    /// the runtime shuts down.
    pub fn spawn(self, handle: RuntimeHandle) -> JoinHandle<()> {
        let Self {
            namespace,
            mut stream,
        } = self;
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => dispatch_frame(namespace, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = handle.deliver(InboundEvent::channel_error(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                };
                if handle.deliver(event).is_err() {
                    break;
                }
            }
            warn!(?namespace, "channel reader stopped");
        })
    }
}

/// Connects one namespace and splits it into its write and read halves.
pub async fn connect_channel(
    server_url: &str,
    namespace: ChannelNamespace,
) -> Result<(WsOutbound, ChannelReader)> {
    let url = channel_url(server_url, namespace)?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    info!(%url, ?namespace, "channel connected");
    let (sink, stream) = ws_stream.split();
    Ok((
        WsOutbound {
            namespace,
            sink: Mutex::new(sink),
        },
        ChannelReader { namespace, stream },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use axum::{
        extract::{
            ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
            State,
        },
        response::IntoResponse,
        routing::get,
        Router,
    };
    use serde_json::Value;
    use shared::domain::UserId;
    use tokio::{net::TcpListener, sync::mpsc, time::timeout};

    use crate::{
        runtime::RuntimeConfig, ClientEvent, MissingBackendApi, SessionDelta, SessionRuntime,
    };

    async fn session_socket(
        ws: WebSocketUpgrade,
        State(received): State<mpsc::UnboundedSender<String>>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| relay(socket, received))
    }

    async fn relay(mut socket: WebSocket, received: mpsc::UnboundedSender<String>) {
        let greeting = r#"{"event":"agent_response","data":{"message":"welcome","agent":"reflection_agent"}}"#;
        if socket
            .send(AxumMessage::Text(greeting.to_string()))
            .await
            .is_err()
        {
            return;
        }
        while let Some(Ok(msg)) = socket.recv().await {
            if let AxumMessage::Text(text) = msg {
                let _ = received.send(text);
            }
        }
    }

    #[tokio::test]
    async fn session_channel_round_trips_through_runtime() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (received_tx, mut received) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/ws", get(session_socket))
            .with_state(received_tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (outbound, reader) =
            connect_channel(&format!("http://{addr}"), ChannelNamespace::Session)
                .await
                .expect("connect");
        let runtime = SessionRuntime::spawn(
            RuntimeConfig {
                user_id: Some(UserId::from("u-1")),
                ..RuntimeConfig::default()
            },
            Arc::new(MissingBackendApi),
            Arc::new(outbound),
        );
        let handle = runtime.handle();
        let mut events = handle.subscribe();
        let _reader = reader.spawn(handle.clone());

        let greeted = timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(ClientEvent::Session(SessionDelta::EntryAppended { entry, .. })) =
                    events.recv().await
                {
                    return entry.content;
                }
            }
        })
        .await
        .expect("greeting");
        assert_eq!(greeted, "welcome");

        handle.submit("ping").expect("submit");
        let frame = timeout(Duration::from_secs(2), received.recv())
            .await
            .expect("frame timed out")
            .expect("server closed");
        let frame: Value = serde_json::from_str(&frame).expect("json frame");
        assert_eq!(frame["event"], "user_message");
        assert_eq!(frame["data"]["userId"], "u-1");
        assert_eq!(frame["data"]["message"], "ping");
    }

    #[test]
    fn maps_http_schemes_to_websocket_urls() {
        assert_eq!(
            channel_url("http://localhost:3000", ChannelNamespace::Session)
                .expect("url")
                .as_str(),
            "ws://localhost:3000/ws"
        );
        assert_eq!(
            channel_url("https://example.com/", ChannelNamespace::Dashboard)
                .expect("url")
                .as_str(),
            "wss://example.com/dashboard"
        );
    }

    #[test]
    fn keeps_base_path_prefix() {
        assert_eq!(
            channel_url("http://host/app", ChannelNamespace::Dashboard)
                .expect("url")
                .as_str(),
            "ws://host/app/dashboard"
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            channel_url("ftp://host", ChannelNamespace::Session),
            Err(TransportError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            channel_url("not a url", ChannelNamespace::Session),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
