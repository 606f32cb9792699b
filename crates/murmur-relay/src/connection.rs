//! Per-connection handler: identify, register, then route frames.
//!
//! The client's anonymous id is the last path segment of the handshake
//! URL. After the greeting, the task forwards frames both ways: queued
//! relay traffic out of the client's channel, matchmaking and
//! partner-bound frames in from the socket.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use murmur_protocol::SignalMessage;

use crate::matchmaker::{QueuedPrefs, Registry};

pub async fn handle(stream: TcpStream, addr: SocketAddr, registry: Registry) {
    let mut path = String::new();
    let ws = match accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
            return;
        }
    };

    let user_id = user_id_from_path(&path);
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let online = registry.join(&user_id, tx).await;
    tracing::info!(peer = %addr, user = %user_id, online, "client connected");

    // Greet the new client directly, then tell everyone (including it)
    // about the new count.
    let greeting = frame(&SignalMessage::Connected {
        user_id: user_id.clone(),
        timestamp: Some(now()),
    });
    if sink.send(Message::Text(greeting.into())).await.is_err() {
        registry.leave(&user_id).await;
        return;
    }
    broadcast_online(&registry).await;

    loop {
        tokio::select! {
            // Relay traffic for this client → its socket.
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this client → matchmaker or partner.
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(msg) => handle_message(&user_id, msg, &registry).await,
                        Err(e) => {
                            tracing::debug!(user = %user_id, error = %e, "undecodable frame");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(peer = %addr, error = %e, "WS error");
                    break;
                }
                _ => {}
            }
        }
    }

    let (partner, online) = registry.leave(&user_id).await;
    tracing::info!(peer = %addr, user = %user_id, online, "client disconnected");

    if let Some(partner_id) = partner {
        send_to(
            &registry,
            &partner_id,
            &SignalMessage::PartnerDisconnected {
                timestamp: Some(now()),
            },
        )
        .await;
    }
    broadcast_online(&registry).await;
}

async fn handle_message(user_id: &str, msg: SignalMessage, registry: &Registry) {
    match msg {
        SignalMessage::FindMatch {
            interests,
            gender_pref,
            user_gender,
        } => {
            enqueue(
                user_id,
                QueuedPrefs {
                    interests,
                    gender_pref,
                    user_gender,
                },
                registry,
            )
            .await;
        }

        SignalMessage::Skip {
            interests,
            gender_pref,
            user_gender,
        } => {
            // Dissolve the current pairing, tell the abandoned partner,
            // then queue again with the fresh preference snapshot.
            if let Some(partner_id) = registry.dissolve(user_id).await {
                send_to(
                    registry,
                    &partner_id,
                    &SignalMessage::PartnerDisconnected {
                        timestamp: Some(now()),
                    },
                )
                .await;
            }
            enqueue(
                user_id,
                QueuedPrefs {
                    interests,
                    gender_pref,
                    user_gender,
                },
                registry,
            )
            .await;
        }

        msg @ (SignalMessage::Offer { .. }
        | SignalMessage::Answer { .. }
        | SignalMessage::IceCandidate { .. }
        | SignalMessage::ChatMessage { .. }) => {
            forward_to_partner(user_id, msg, registry).await;
        }

        other => {
            tracing::debug!(user = %user_id, ?other, "client sent a relay-only frame");
        }
    }
}

async fn enqueue(user_id: &str, prefs: QueuedPrefs, registry: &Registry) {
    match registry.find_match(user_id, prefs).await {
        Some(partner_id) => {
            // The requester initiates the negotiation.
            send_to(
                registry,
                user_id,
                &SignalMessage::MatchFound {
                    partner_id: partner_id.clone(),
                    is_initiator: true,
                    timestamp: Some(now()),
                },
            )
            .await;
            send_to(
                registry,
                &partner_id,
                &SignalMessage::MatchFound {
                    partner_id: user_id.to_string(),
                    is_initiator: false,
                    timestamp: Some(now()),
                },
            )
            .await;
        }
        None => {
            send_to(
                registry,
                user_id,
                &SignalMessage::Waiting {
                    message: Some("Looking for a partner...".into()),
                    timestamp: Some(now()),
                },
            )
            .await;
        }
    }
}

/// Stamp the sender and forward to the current partner. Frames with no
/// partner are dropped — they belong to a pairing that no longer
/// exists.
async fn forward_to_partner(user_id: &str, msg: SignalMessage, registry: &Registry) {
    let stamped = match msg {
        SignalMessage::Offer { data, .. } => SignalMessage::Offer {
            data,
            from: Some(user_id.to_string()),
        },
        SignalMessage::Answer { data, .. } => SignalMessage::Answer {
            data,
            from: Some(user_id.to_string()),
        },
        SignalMessage::IceCandidate { data, .. } => SignalMessage::IceCandidate {
            data,
            from: Some(user_id.to_string()),
        },
        SignalMessage::ChatMessage { message, .. } => SignalMessage::ChatMessage {
            message,
            from: Some(user_id.to_string()),
        },
        other => other,
    };

    match registry.partner_of(user_id).await {
        Some(partner_tx) => {
            let _ = partner_tx.send(frame(&stamped)).await;
        }
        None => {
            tracing::debug!(user = %user_id, "frame with no partner dropped");
        }
    }
}

async fn send_to(registry: &Registry, user_id: &str, msg: &SignalMessage) {
    if let Some(tx) = registry.client(user_id).await {
        let _ = tx.send(frame(msg)).await;
    }
}

async fn broadcast_online(registry: &Registry) {
    let (clients, count) = registry.clients_and_count().await;
    let msg = frame(&SignalMessage::OnlineCount {
        count: count as u32,
        timestamp: Some(now()),
    });
    for tx in clients {
        let _ = tx.send(msg.clone()).await;
    }
}

fn frame(msg: &SignalMessage) -> String {
    serde_json::to_string(msg).unwrap()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn user_id_from_path(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "ws")
        .map(str::to_string)
        .unwrap_or_else(|| format!("user_{}", uuid::Uuid::new_v4().simple()))
}
