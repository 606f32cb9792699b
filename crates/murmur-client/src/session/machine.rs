//! The controller: canonical session state and every transition.
//!
//! A single task consumes user actions, transport frames, and the
//! epoch-tagged results of per-pairing work, and publishes a fresh
//! [`ClientSnapshot`] after each one. Nothing here blocks: anything
//! slow (microphone prompts, negotiation) runs in the pairing driver
//! and re-enters as an event.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use murmur_protocol::SignalMessage;

use crate::chat::{ChatLog, ChatOrigin};
use crate::config::ClientConfig;
use crate::detector::{self, DetectorHandle};
use crate::media::{AudioSource, LinkState, MediaEngine};
use crate::transport::{TransportEvent, TransportFactory, TransportLink};

use super::driver::{run_pairing_driver, DriverContext};
use super::events::{ControlEvent, DriverCommand, InternalEvent, Party, UserAction};
use super::{ClientSnapshot, Preferences, Role, SessionPhase};

const CELEBRATION: std::time::Duration = std::time::Duration::from_secs(2);

const NOTICE_SELECT_GENDER: &str = "Please select your gender before starting a call";
const NOTICE_MIC_DENIED: &str = "Microphone access denied. Please allow microphone access.";
const NOTICE_SETUP_FAILED: &str = "Failed to establish connection";
const NOTICE_PARTNER_LEFT: &str = "Partner disconnected";
const NOTICE_CONNECTION: &str = "Connection error. Please try again.";

/// Session-scoped resources. Dropping this is the teardown: the driver
/// sees its command channel close and releases the negotiation session,
/// and the detector handles stop their sampling tasks.
struct Pairing {
    role: Role,
    commands: mpsc::Sender<DriverCommand>,
    source: Option<Arc<dyn AudioSource>>,
    local_detector: Option<DetectorHandle>,
    remote_detector: Option<DetectorHandle>,
}

pub(super) struct Controller {
    config: ClientConfig,
    engine: Arc<dyn MediaEngine>,
    transport_factory: Arc<dyn TransportFactory>,
    user_id: String,
    events_tx: mpsc::Sender<ControlEvent>,
    snapshot_tx: watch::Sender<ClientSnapshot>,

    phase: SessionPhase,
    /// Generation counter for the current pairing. Bumped on every new
    /// pairing; events carrying an older value are stale and dropped.
    epoch: u64,
    pairing: Option<Pairing>,
    /// Resolves when the most recent driver has closed its session; the
    /// next driver waits on it before opening a new one.
    close_fence: Option<oneshot::Receiver<()>>,
    /// Generation counter for the transport, so frames from a channel
    /// the user already ended cannot leak into a later one.
    link: u64,
    transport: Option<TransportLink>,

    chat: ChatLog,
    prefs: Preferences,
    muted: watch::Sender<bool>,
    online: u32,
    notice: Option<String>,
    local_talking: bool,
    remote_talking: bool,
    celebrating: bool,
}

impl Controller {
    pub(super) fn new(
        config: ClientConfig,
        engine: Arc<dyn MediaEngine>,
        transport_factory: Arc<dyn TransportFactory>,
        events_tx: mpsc::Sender<ControlEvent>,
        snapshot_tx: watch::Sender<ClientSnapshot>,
    ) -> Self {
        Self {
            config,
            engine,
            transport_factory,
            user_id: generate_user_id(),
            events_tx,
            snapshot_tx,
            phase: SessionPhase::Idle,
            epoch: 0,
            pairing: None,
            close_fence: None,
            link: 0,
            transport: None,
            chat: ChatLog::default(),
            prefs: Preferences::default(),
            muted: watch::channel(false).0,
            online: 0,
            notice: None,
            local_talking: false,
            remote_talking: false,
            celebrating: false,
        }
    }

    pub(super) async fn run(
        mut self,
        mut actions: mpsc::Receiver<UserAction>,
        mut events: mpsc::Receiver<ControlEvent>,
    ) {
        // The relay channel is process-wide singleton state, opened on
        // mount so the online gauge works before the first call.
        self.ensure_transport();
        self.publish();

        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => {
                        self.on_action(action).await;
                        self.publish();
                    }
                    // Every client handle is gone.
                    None => break,
                },
                Some(event) = events.recv() => {
                    self.on_event(event).await;
                    self.publish();
                }
            }
        }

        self.teardown_pairing();
        self.shutdown_transport();
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    async fn on_action(&mut self, action: UserAction) {
        match action {
            UserAction::Start => self.on_start().await,
            UserAction::Skip => self.on_skip().await,
            UserAction::End => self.on_end(),
            UserAction::ToggleMute => self.on_toggle_mute(),
            UserAction::SendChat(text) => self.on_send_chat(text).await,
            UserAction::SetInterests(interests) => self.prefs.interests = interests,
            UserAction::SetGender(gender) => self.prefs.gender = Some(gender),
            UserAction::SetGenderFilter(filter) => self.prefs.gender_filter = filter,
        }
    }

    async fn on_start(&mut self) {
        if self.phase != SessionPhase::Idle {
            tracing::debug!(phase = ?self.phase, "start ignored");
            return;
        }
        let Some(gender) = self.prefs.gender else {
            self.notice = Some(NOTICE_SELECT_GENDER.into());
            return;
        };

        self.ensure_transport();
        self.notice = None;
        self.enter_searching();
        self.send_signal(SignalMessage::FindMatch {
            interests: self.prefs.interests.clone(),
            gender_pref: self.prefs.gender_filter,
            user_gender: gender,
        })
        .await;
    }

    async fn on_skip(&mut self) {
        let Some(gender) = self.prefs.gender else {
            self.enter_idle(Some(NOTICE_SELECT_GENDER));
            return;
        };

        self.ensure_transport();
        self.notice = None;
        self.enter_searching();
        self.send_signal(SignalMessage::Skip {
            interests: self.prefs.interests.clone(),
            gender_pref: self.prefs.gender_filter,
            user_gender: gender,
        })
        .await;
    }

    fn on_end(&mut self) {
        self.enter_idle(None);
        self.notice = None;
        self.shutdown_transport();
    }

    fn on_toggle_mute(&mut self) {
        let muted = !*self.muted.borrow();
        self.muted.send_replace(muted);
        if let Some(source) = self.pairing.as_ref().and_then(|p| p.source.as_ref()) {
            source.set_enabled(!muted);
        }
    }

    async fn on_send_chat(&mut self, text: String) {
        if self.phase != SessionPhase::Connected || text.trim().is_empty() {
            return;
        }
        self.chat.append(text.clone(), ChatOrigin::Local);
        self.send_signal(SignalMessage::ChatMessage {
            message: text,
            from: None,
        })
        .await;
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn on_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Transport { link, event } => self.on_transport(link, event).await,
            ControlEvent::Internal(event) => self.on_internal(event),
        }
    }

    async fn on_transport(&mut self, link: u64, event: TransportEvent) {
        if link != self.link || self.transport.is_none() {
            tracing::debug!("event from a stale transport dropped");
            return;
        }
        match event {
            TransportEvent::Open => {
                self.notice = None;
            }
            TransportEvent::Closed => {
                // The channel is gone, so whatever session rode on it is
                // too. The transport task retries on its own.
                self.enter_idle(Some(NOTICE_CONNECTION));
            }
            TransportEvent::Message(msg) => self.on_signal(msg).await,
        }
    }

    async fn on_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::Connected { user_id, .. } => {
                tracing::debug!(user = %user_id, "relay greeting");
            }
            SignalMessage::Waiting { .. } => {
                if self.phase != SessionPhase::Searching {
                    tracing::debug!(phase = ?self.phase, "queue ack outside search");
                }
            }
            SignalMessage::MatchFound {
                partner_id,
                is_initiator,
                ..
            } => self.on_match_found(partner_id, is_initiator),
            SignalMessage::Offer { data, .. } => {
                self.forward_to_driver(DriverCommand::RemoteOffer(data)).await;
            }
            SignalMessage::Answer { data, .. } => {
                self.forward_to_driver(DriverCommand::RemoteAnswer(data)).await;
            }
            SignalMessage::IceCandidate { data, .. } => {
                self.forward_to_driver(DriverCommand::RemoteCandidate(data)).await;
            }
            SignalMessage::PartnerDisconnected { .. } => self.on_partner_lost(),
            SignalMessage::ChatMessage { message, .. } => {
                if self.phase == SessionPhase::Connected {
                    self.chat.append(message, ChatOrigin::Remote);
                } else {
                    // Late echo from a pairing that no longer exists.
                    tracing::debug!("chat message outside an active session dropped");
                }
            }
            SignalMessage::OnlineCount { count, .. } => self.online = count,
            SignalMessage::FindMatch { .. } | SignalMessage::Skip { .. } => {
                tracing::debug!("client-bound frame of an outbound type dropped");
            }
        }
    }

    fn on_match_found(&mut self, partner_id: String, is_initiator: bool) {
        // A new pairing unconditionally supersedes the previous one.
        self.teardown_pairing();
        self.chat.clear();
        self.epoch += 1;
        let epoch = self.epoch;
        let role = if is_initiator {
            Role::Initiator
        } else {
            Role::Responder
        };
        tracing::info!(partner = %partner_id, ?role, "match found");

        self.phase = SessionPhase::Connecting;
        self.notice = None;
        self.celebrating = true;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CELEBRATION).await;
            let _ = events
                .send(ControlEvent::Internal(InternalEvent::CelebrationOver { epoch }))
                .await;
        });

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (closed_tx, closed_rx) = oneshot::channel();
        let fence = self.close_fence.replace(closed_rx);
        let ctx = DriverContext {
            epoch,
            role,
            engine: self.engine.clone(),
            ice_servers: self.config.ice_servers.clone(),
            events: self.events_tx.clone(),
        };
        tokio::spawn(run_pairing_driver(ctx, commands_rx, fence, closed_tx));

        self.pairing = Some(Pairing {
            role,
            commands: commands_tx,
            source: None,
            local_detector: None,
            remote_detector: None,
        });
    }

    fn on_partner_lost(&mut self) {
        if self.pairing.is_none() {
            tracing::debug!("partner departure with no pairing dropped");
            return;
        }
        self.enter_idle(Some(NOTICE_PARTNER_LEFT));
    }

    async fn forward_to_driver(&mut self, cmd: DriverCommand) {
        match &self.pairing {
            Some(pairing) => {
                if pairing.commands.send(cmd).await.is_err() {
                    tracing::debug!("pairing driver already gone");
                }
            }
            None => tracing::debug!("negotiation message with no pairing dropped"),
        }
    }

    // ------------------------------------------------------------------
    // Pairing-internal events
    // ------------------------------------------------------------------

    fn on_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::CaptureReady { epoch, source } => {
                if self.stale(epoch) {
                    return;
                }
                // The fresh capture inherits the user's standing mute.
                source.set_enabled(!*self.muted.borrow());
                let handle = detector::attach(
                    source.clone(),
                    Party::Local,
                    epoch,
                    self.config.talk_threshold,
                    Some(self.muted.subscribe()),
                    self.events_tx.clone(),
                );
                if let Some(pairing) = self.pairing.as_mut() {
                    pairing.source = Some(source);
                    pairing.local_detector = Some(handle);
                }
            }
            InternalEvent::CaptureFailed { epoch, error } => {
                if self.stale(epoch) {
                    return;
                }
                tracing::warn!(error = %error, "microphone acquisition failed");
                self.enter_idle(Some(NOTICE_MIC_DENIED));
            }
            InternalEvent::PairingFailed { epoch, error } => {
                if self.stale(epoch) {
                    return;
                }
                tracing::warn!(error = %error, "pairing setup failed");
                self.enter_idle(Some(NOTICE_SETUP_FAILED));
            }
            InternalEvent::Outbound { epoch, message } => {
                if self.stale(epoch) {
                    tracing::debug!("negotiation message from a stale pairing dropped");
                    return;
                }
                // send_signal is async only for queueing; negotiation
                // traffic goes out through the same ordered queue.
                let message_tx = self.transport.as_ref().map(|t| t.outbound.clone());
                if let Some(tx) = message_tx {
                    if tx.try_send(message).is_err() {
                        tracing::warn!("outbound queue full; negotiation message dropped");
                    }
                } else {
                    tracing::debug!("no transport; negotiation message dropped");
                }
            }
            InternalEvent::RemoteStream { epoch, source } => {
                if self.stale(epoch) {
                    return;
                }
                let handle = detector::attach(
                    source,
                    Party::Remote,
                    epoch,
                    self.config.talk_threshold,
                    None,
                    self.events_tx.clone(),
                );
                if let Some(pairing) = self.pairing.as_mut() {
                    pairing.remote_detector = Some(handle);
                }
            }
            InternalEvent::Link { epoch, state } => {
                if self.stale(epoch) {
                    return;
                }
                match state {
                    LinkState::Connected => {
                        if self.phase == SessionPhase::Connecting {
                            if let Some(pairing) = &self.pairing {
                                tracing::info!(role = ?pairing.role, "media path established");
                            }
                            self.phase = SessionPhase::Connected;
                        }
                    }
                    LinkState::Disconnected | LinkState::Failed => {
                        // Silent network failure; same outcome as an
                        // explicit departure message.
                        self.on_partner_lost();
                    }
                }
            }
            InternalEvent::Talking {
                epoch,
                party,
                active,
            } => {
                if self.stale(epoch) {
                    return;
                }
                match party {
                    Party::Local => self.local_talking = active,
                    Party::Remote => self.remote_talking = active,
                }
            }
            InternalEvent::CelebrationOver { epoch } => {
                if epoch == self.epoch {
                    self.celebrating = false;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions and helpers
    // ------------------------------------------------------------------

    fn stale(&self, epoch: u64) -> bool {
        epoch != self.epoch || self.pairing.is_none()
    }

    fn enter_searching(&mut self) {
        self.teardown_pairing();
        self.chat.clear();
        self.phase = SessionPhase::Searching;
    }

    fn enter_idle(&mut self, notice: Option<&str>) {
        self.teardown_pairing();
        self.chat.clear();
        self.phase = SessionPhase::Idle;
        if let Some(notice) = notice {
            self.notice = Some(notice.into());
        }
    }

    fn teardown_pairing(&mut self) {
        if let Some(pairing) = self.pairing.take() {
            if let Some(detector) = pairing.local_detector {
                detector.detach();
            }
            if let Some(detector) = pairing.remote_detector {
                detector.detach();
            }
            // Dropping the command sender tells the driver to close the
            // negotiation session.
            drop(pairing.commands);
        }
        self.local_talking = false;
        self.remote_talking = false;
        self.celebrating = false;
    }

    fn ensure_transport(&mut self) {
        if self.transport.is_some() {
            return;
        }
        self.link += 1;
        let url = format!(
            "{}/{}",
            self.config.relay_url.trim_end_matches('/'),
            self.user_id
        );
        self.transport = Some(self.transport_factory.spawn(
            url,
            self.config.reconnect_delay(),
            self.link,
            self.events_tx.clone(),
        ));
    }

    fn shutdown_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.shutdown.try_send(());
        }
    }

    async fn send_signal(&mut self, message: SignalMessage) {
        match &self.transport {
            Some(transport) => {
                if transport.outbound.send(message).await.is_err() {
                    tracing::warn!("transport task gone; outbound message dropped");
                }
            }
            None => tracing::debug!("no transport; outbound message dropped"),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ClientSnapshot {
            phase: self.phase,
            online: self.online,
            notice: self.notice.clone(),
            muted: *self.muted.borrow(),
            local_talking: self.local_talking,
            remote_talking: self.remote_talking,
            celebrating: self.celebrating,
            chat: self.chat.entries().to_vec(),
        });
    }
}

/// Anonymous per-process identity sent as the relay URL's last segment.
fn generate_user_id() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("user_{suffix}")
}
