use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::api::events::IncomingEvent;
use crate::chat::protocol::{self, HubFrame};

pub const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid hub url {url}: {detail}")]
    Url { url: String, detail: String },
    #[error("hub connection failed: {0}")]
    Connect(String),
    #[error("hub handshake failed: {0}")]
    Handshake(String),
}

/// A client-to-server hub method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn new(method: &str, arguments: Vec<Value>) -> Self {
        Self { method: method.to_string(), arguments }
    }
}

/// Both directions of a live hub connection. Dropping `invocations` closes the
/// socket; `events` ends when the socket closes.
pub struct HubLink {
    pub invocations: mpsc::UnboundedSender<Invocation>,
    pub events: mpsc::UnboundedReceiver<IncomingEvent>,
}

pub trait HubConnector: Send + Sync {
    fn connect(&self, access_token: &str) -> BoxFuture<'static, Result<HubLink, HubError>>;
}

/// Connects to an ASP.NET Core SignalR hub over WebSockets, skipping negotiation.
pub struct SignalRConnector {
    hub_url: String,
    keep_alive: Duration,
}

impl SignalRConnector {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self { hub_url: hub_url.into(), keep_alive: KEEP_ALIVE }
    }

    pub fn socket_url(hub_url: &str, access_token: &str) -> Result<Url, HubError> {
        let mut url = Url::parse(hub_url).map_err(|e| HubError::Url {
            url: hub_url.to_string(),
            detail: e.to_string(),
        })?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(HubError::Url { url: hub_url.to_string(), detail: format!("unsupported scheme {other}") });
            }
        };
        url.set_scheme(scheme).map_err(|_| HubError::Url {
            url: hub_url.to_string(),
            detail: "cannot switch scheme".into(),
        })?;
        url.query_pairs_mut().append_pair("access_token", access_token);
        Ok(url)
    }
}

impl HubConnector for SignalRConnector {
    fn connect(&self, access_token: &str) -> BoxFuture<'static, Result<HubLink, HubError>> {
        let url = Self::socket_url(&self.hub_url, access_token);
        let keep_alive = self.keep_alive;
        Box::pin(async move { open_link(url?, keep_alive).await })
    }
}

async fn open_link(url: Url, keep_alive: Duration) -> Result<HubLink, HubError> {
    let (ws, _) = connect_async(url.to_string())
        .await
        .map_err(|e| HubError::Connect(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    sink.send(WsMessage::Text(protocol::handshake_request()))
        .await
        .map_err(|e| HubError::Handshake(e.to_string()))?;
    let early_frames = loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => break protocol::parse_handshake(&text).map_err(HubError::Handshake)?,
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(HubError::Handshake("socket closed during handshake".into()));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(HubError::Handshake(e.to_string())),
        }
    };
    log::info!("Chat hub connected");

    let (inv_tx, mut inv_rx) = mpsc::unbounded_channel::<Invocation>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<IncomingEvent>();
    for frame in early_frames {
        forward(frame, &event_tx);
    }

    crate::utils::spawn_async(async move {
        let mut ping = tokio::time::interval(keep_alive);
        ping.tick().await;
        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let mut closed = false;
                            for frame in protocol::parse_frames(&text) {
                                match frame {
                                    Ok(HubFrame::Close { error }) => {
                                        log::info!("Hub sent close{}", error.map(|e| format!(": {e}")).unwrap_or_default());
                                        closed = true;
                                    }
                                    Ok(frame) => {
                                        if !forward(frame, &event_tx) {
                                            closed = true;
                                        }
                                    }
                                    Err(e) => log::warn!("{e}"),
                                }
                            }
                            if closed {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::warn!("Hub socket error: {e}");
                            break;
                        }
                    }
                }
                inv = inv_rx.recv() => {
                    match inv {
                        Some(inv) => {
                            let text = protocol::encode_invocation(&inv.method, &inv.arguments);
                            if let Err(e) = sink.send(WsMessage::Text(text)).await {
                                log::warn!("Hub invoke {} failed: {e}", inv.method);
                                break;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
                _ = ping.tick() => {
                    if sink.send(WsMessage::Text(protocol::encode_ping())).await.is_err() {
                        break;
                    }
                }
            }
        }
        log::info!("Chat hub connection closed");
    });

    Ok(HubLink { invocations: inv_tx, events: event_rx })
}

/// Returns false once nobody is listening for events any more.
fn forward(frame: HubFrame, events: &mpsc::UnboundedSender<IncomingEvent>) -> bool {
    match frame {
        HubFrame::Invocation { target, arguments } => {
            events.send(IncomingEvent { event_type: target, data: arguments }).is_ok()
        }
        HubFrame::Completion { error: Some(e), invocation_id } => {
            log::warn!("Hub invocation {:?} failed: {e}", invocation_id);
            true
        }
        _ => true,
    }
}
