//! Per-pairing negotiation driver.
//!
//! One task per pairing owns the negotiation session: it acquires the
//! microphone, opens the session, produces the offer (or answers the
//! peer's), applies inbound negotiation messages in arrival order, and
//! forwards session events to the controller tagged with the pairing's
//! epoch. The controller tears it down by closing the command channel;
//! the driver closes its session on the way out and only then releases
//! the fence the next pairing waits on — two sessions are never alive
//! at once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use murmur_protocol::{SessionDescription, SignalMessage};

use crate::config::IceServer;
use crate::error::MediaError;
use crate::media::{MediaEngine, NegotiationSession, SessionEvent};

use super::events::{ControlEvent, DriverCommand, InternalEvent};
use super::Role;

pub(crate) struct DriverContext {
    pub(crate) epoch: u64,
    pub(crate) role: Role,
    pub(crate) engine: Arc<dyn MediaEngine>,
    pub(crate) ice_servers: Vec<IceServer>,
    pub(crate) events: mpsc::Sender<ControlEvent>,
}

impl DriverContext {
    async fn emit(&self, event: InternalEvent) -> Result<(), ()> {
        self.events
            .send(ControlEvent::Internal(event))
            .await
            .map_err(|_| ())
    }
}

pub(crate) async fn run_pairing_driver(
    ctx: DriverContext,
    mut commands: mpsc::Receiver<DriverCommand>,
    prior_closed: Option<oneshot::Receiver<()>>,
    closed_tx: oneshot::Sender<()>,
) {
    // Never open a session while the previous pairing still holds media
    // resources.
    if let Some(fence) = prior_closed {
        let _ = fence.await;
    }

    let epoch = ctx.epoch;

    let source = match ctx.engine.capture_audio().await {
        Ok(source) => source,
        Err(error) => {
            let _ = ctx.emit(InternalEvent::CaptureFailed { epoch, error }).await;
            let _ = closed_tx.send(());
            return;
        }
    };

    let ready = InternalEvent::CaptureReady {
        epoch,
        source: source.clone(),
    };
    if ctx.emit(ready).await.is_err() {
        let _ = closed_tx.send(());
        return;
    }

    let (session_tx, mut session_rx) = mpsc::channel(64);
    let mut session = match ctx
        .engine
        .open_session(source, &ctx.ice_servers, session_tx)
        .await
    {
        Ok(session) => session,
        Err(error) => {
            let _ = ctx.emit(InternalEvent::PairingFailed { epoch, error }).await;
            let _ = closed_tx.send(());
            return;
        }
    };

    if ctx.role == Role::Initiator {
        match session.create_offer().await {
            Ok(data) => {
                let message = SignalMessage::Offer { data, from: None };
                let _ = ctx.emit(InternalEvent::Outbound { epoch, message }).await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "offer creation failed");
                let _ = ctx.emit(InternalEvent::PairingFailed { epoch, error }).await;
                session.close().await;
                let _ = closed_tx.send(());
                return;
            }
        }
    }

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => apply_command(&ctx, session.as_mut(), cmd).await,
                // Controller tore this pairing down.
                None => break,
            },
            event = session_rx.recv() => match event {
                Some(event) => forward_session_event(&ctx, event).await,
                // The binding dropped its event sender; nothing more
                // will come from this session.
                None => break,
            },
        }
    }

    session.close().await;
    let _ = closed_tx.send(());
}

/// Apply one inbound negotiation message. Malformed or mistimed traffic
/// must not kill an otherwise healthy pairing: log and move on.
async fn apply_command(
    ctx: &DriverContext,
    session: &mut dyn NegotiationSession,
    cmd: DriverCommand,
) {
    let result = match cmd {
        DriverCommand::RemoteOffer(desc) => answer_offer(ctx, session, desc).await,
        DriverCommand::RemoteAnswer(desc) => session.apply_remote(desc).await,
        DriverCommand::RemoteCandidate(candidate) => session.add_remote_candidate(candidate).await,
    };
    if let Err(error) = result {
        tracing::warn!(error = %error, "negotiation message dropped");
    }
}

async fn answer_offer(
    ctx: &DriverContext,
    session: &mut dyn NegotiationSession,
    desc: SessionDescription,
) -> Result<(), MediaError> {
    session.apply_remote(desc).await?;
    let data = session.create_answer().await?;
    let message = SignalMessage::Answer { data, from: None };
    let _ = ctx
        .emit(InternalEvent::Outbound {
            epoch: ctx.epoch,
            message,
        })
        .await;
    Ok(())
}

async fn forward_session_event(ctx: &DriverContext, event: SessionEvent) {
    let epoch = ctx.epoch;
    let internal = match event {
        // Candidates go to the peer the moment they are discovered.
        SessionEvent::LocalCandidate(data) => InternalEvent::Outbound {
            epoch,
            message: SignalMessage::IceCandidate { data, from: None },
        },
        SessionEvent::RemoteStream(source) => InternalEvent::RemoteStream { epoch, source },
        SessionEvent::Link(state) => InternalEvent::Link { epoch, state },
    };
    let _ = ctx.emit(internal).await;
}
