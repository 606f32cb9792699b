//! Reconnecting WebSocket channel to the signaling relay.
//!
//! One task owns the socket. Outbound messages arrive on a queue that is
//! only drained while the channel is open, so anything sent during an
//! outage is flushed after the next successful dial. On unexpected loss
//! the task retries after a fixed delay; an explicit shutdown (user
//! ended the session) exits the loop instead.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use murmur_protocol::SignalMessage;

use crate::session::events::ControlEvent;

/// Channel-level notifications delivered to the controller, tagged with
/// the transport generation they came from.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// The channel is open; queued outbound messages are flushing.
    Open,
    /// A signaling frame, in receipt order.
    Message(SignalMessage),
    /// The channel was lost; a retry is scheduled.
    Closed,
}

/// Sender half handed to the controller.
pub(crate) struct TransportLink {
    pub(crate) outbound: mpsc::Sender<SignalMessage>,
    pub(crate) shutdown: mpsc::Sender<()>,
}

/// Spawns the signaling channel task. The default factory dials the
/// relay over WebSocket; tests substitute scripted channels.
pub(crate) trait TransportFactory: Send + Sync {
    fn spawn(
        &self,
        url: String,
        reconnect_delay: Duration,
        link: u64,
        events: mpsc::Sender<ControlEvent>,
    ) -> TransportLink;
}

pub(crate) struct WsTransport;

impl TransportFactory for WsTransport {
    fn spawn(
        &self,
        url: String,
        reconnect_delay: Duration,
        link: u64,
        events: mpsc::Sender<ControlEvent>,
    ) -> TransportLink {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(run_transport(
            url,
            reconnect_delay,
            link,
            outbound_rx,
            events,
            shutdown_rx,
        ));
        TransportLink {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        }
    }
}

enum LinkEnd {
    Shutdown,
    Lost(String),
}

/// Connect loop with fixed-delay retry.
async fn run_transport(
    url: String,
    reconnect_delay: Duration,
    link: u64,
    mut outbound: mpsc::Receiver<SignalMessage>,
    events: mpsc::Sender<ControlEvent>,
    mut shutdown: mpsc::Receiver<()>,
) {
    loop {
        tracing::info!(url = %url, "connecting to relay");
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                if send_event(&events, link, TransportEvent::Open).await.is_err() {
                    return;
                }
                match channel_session(ws, link, &mut outbound, &events, &mut shutdown).await {
                    LinkEnd::Shutdown => return,
                    LinkEnd::Lost(reason) => {
                        tracing::warn!(reason = %reason, "relay channel lost");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to reach relay");
            }
        }

        if send_event(&events, link, TransportEvent::Closed).await.is_err() {
            return;
        }

        // Fixed interval, not backoff — the relay is assumed lightly
        // loaded. An explicit shutdown cancels the retry.
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.recv() => return,
        }
    }
}

/// One open socket: drain the outbound queue, forward inbound frames.
async fn channel_session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    link: u64,
    outbound: &mut mpsc::Receiver<SignalMessage>,
    events: &mpsc::Sender<ControlEvent>,
    shutdown: &mut mpsc::Receiver<()>,
) -> LinkEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    let json = serde_json::to_string(&msg).unwrap();
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        return LinkEnd::Lost("send failed".into());
                    }
                }
                // Controller dropped its sender — shutting down.
                None => {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(msg) => {
                            if send_event(events, link, TransportEvent::Message(msg)).await.is_err() {
                                return LinkEnd::Shutdown;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "undecodable frame from relay");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return LinkEnd::Lost("relay closed connection".into());
                }
                Some(Err(e)) => {
                    return LinkEnd::Lost(format!("ws error: {e}"));
                }
                _ => {}
            },

            _ = shutdown.recv() => {
                let _ = sink.close().await;
                return LinkEnd::Shutdown;
            }
        }
    }
}

async fn send_event(
    events: &mpsc::Sender<ControlEvent>,
    link: u64,
    event: TransportEvent,
) -> Result<(), ()> {
    events
        .send(ControlEvent::Transport { link, event })
        .await
        .map_err(|_| ())
}
