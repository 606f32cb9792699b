//! Session orchestration.
//!
//! [`Client`] is the surface a presentation layer drives. Behind it one
//! controller task owns the canonical session state: it consumes relay
//! frames, media events, detector edges, and user actions, and publishes
//! a [`ClientSnapshot`] on every change. All other components are
//! stateless or hold only resources the controller creates and destroys.

pub(crate) mod events;

mod driver;
mod machine;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use murmur_protocol::{Gender, GenderFilter};

use crate::chat::ChatEntry;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::media::MediaEngine;
use crate::transport::{TransportFactory, WsTransport};

use events::UserAction;
use machine::Controller;

/// Lifecycle phase of the (at most one) current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session, nothing queued.
    #[default]
    Idle,
    /// Queued at the relay, waiting for a partner.
    Searching,
    /// Pairing assigned; media negotiation in progress.
    Connecting,
    /// Direct media path established.
    Connected,
}

/// Who produces the negotiation offer. Assigned by the relay, fixed for
/// the pairing's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Matchmaking preferences. A snapshot travels with every find/skip
/// request; nothing is stored server-side.
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub interests: Vec<String>,
    pub gender_filter: GenderFilter,
    /// Must be selected before a session can start.
    pub gender: Option<Gender>,
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    pub phase: SessionPhase,
    /// Relay-reported number of clients online.
    pub online: u32,
    /// Latest user-facing notice, overwritten by newer events.
    pub notice: Option<String>,
    pub muted: bool,
    pub local_talking: bool,
    pub remote_talking: bool,
    /// True for the first two seconds after a match is found.
    pub celebrating: bool,
    pub chat: Vec<ChatEntry>,
}

/// Handle to a running client. Cheap to clone; the controller shuts
/// down once every handle is dropped.
#[derive(Clone)]
pub struct Client {
    actions: mpsc::Sender<UserAction>,
    snapshot: watch::Receiver<ClientSnapshot>,
}

impl Client {
    /// Spawn the controller and open the relay channel.
    pub fn connect(config: ClientConfig, engine: Arc<dyn MediaEngine>) -> Client {
        Self::connect_with(config, engine, Arc::new(WsTransport))
    }

    pub(crate) fn connect_with(
        config: ClientConfig,
        engine: Arc<dyn MediaEngine>,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Client {
        let (actions_tx, actions_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(ClientSnapshot::default());
        let controller = Controller::new(config, engine, transport_factory, events_tx, snapshot_tx);
        tokio::spawn(controller.run(actions_rx, events_rx));
        Client {
            actions: actions_tx,
            snapshot: snapshot_rx,
        }
    }

    /// Enter the matchmaking queue. Surfaces a validation notice and
    /// stays idle if no gender has been selected.
    pub async fn start_session(&self) -> Result<(), ClientError> {
        self.act(UserAction::Start).await
    }

    /// Abandon the current pairing and immediately queue for a new one.
    pub async fn skip_partner(&self) -> Result<(), ClientError> {
        self.act(UserAction::Skip).await
    }

    /// Tear everything down, including the relay channel. No automatic
    /// reconnect follows.
    pub async fn end_session(&self) -> Result<(), ClientError> {
        self.act(UserAction::End).await
    }

    /// Flip the microphone mute. Independent of the session phase.
    pub async fn toggle_mute(&self) -> Result<(), ClientError> {
        self.act(UserAction::ToggleMute).await
    }

    /// Send a chat line to the current partner. A no-op unless a
    /// session is active.
    pub async fn send_chat_message(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.act(UserAction::SendChat(text.into())).await
    }

    pub async fn set_interests(&self, interests: Vec<String>) -> Result<(), ClientError> {
        self.act(UserAction::SetInterests(interests)).await
    }

    pub async fn set_gender(&self, gender: Gender) -> Result<(), ClientError> {
        self.act(UserAction::SetGender(gender)).await
    }

    pub async fn set_gender_filter(&self, filter: GenderFilter) -> Result<(), ClientError> {
        self.act(UserAction::SetGenderFilter(filter)).await
    }

    /// Current observable state.
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch observable state changes.
    pub fn watch(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    async fn act(&self, action: UserAction) -> Result<(), ClientError> {
        self.actions
            .send(action)
            .await
            .map_err(|_| ClientError::Closed)
    }
}
