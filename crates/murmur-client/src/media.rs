//! Media capability contracts.
//!
//! The session controller never touches a real audio or peer-to-peer
//! stack; it drives these traits. Any binding that satisfies them works —
//! a native media engine in production, scripted doubles in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use murmur_protocol::{IceCandidate, SessionDescription};

use crate::config::IceServer;
use crate::error::MediaError;

/// Number of frequency bins a source reports (1024-point transform).
pub const SPECTRUM_BINS: usize = 512;

/// A live audio stream that can be sampled for activity detection.
///
/// The capture source is shared between the negotiation session (for
/// transmission) and the local talk detector (for sampling); remote
/// sources arrive via [`SessionEvent::RemoteStream`].
pub trait AudioSource: Send + Sync {
    /// Fill `out` with the latest frequency-domain magnitudes, one byte
    /// per bin (0..=255). `out` has [`SPECTRUM_BINS`] elements.
    fn frequency_magnitudes(&self, out: &mut [u8]);

    /// Enable or disable capture without releasing the device. Used for
    /// mute; a disabled source transmits silence.
    fn set_enabled(&self, enabled: bool);
}

/// Coarse connectivity of the direct media path. Watched by the session
/// controller to detect peer loss even when the relay never says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
}

/// Asynchronous notifications from a negotiation session.
pub enum SessionEvent {
    /// A locally discovered connectivity candidate. Forwarded to the
    /// peer immediately; candidates are never batched.
    LocalCandidate(IceCandidate),
    /// The peer's audio stream became available.
    RemoteStream(Arc<dyn AudioSource>),
    /// The direct media path changed state.
    Link(LinkState),
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            SessionEvent::RemoteStream(_) => f.write_str("RemoteStream(..)"),
            SessionEvent::Link(s) => f.debug_tuple("Link").field(s).finish(),
        }
    }
}

/// Factory for capture sources and negotiation sessions.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Acquire the microphone. May prompt the user; resolves with
    /// [`MediaError::PermissionDenied`] if they refuse.
    async fn capture_audio(&self) -> Result<Arc<dyn AudioSource>, MediaError>;

    /// Create a fresh negotiation session transmitting `source`.
    /// Session events are delivered on `events` until the session is
    /// closed or the receiver is dropped.
    async fn open_session(
        &self,
        source: Arc<dyn AudioSource>,
        ice_servers: &[IceServer],
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn NegotiationSession>, MediaError>;
}

/// One direct media session with one peer.
///
/// A closed session is dead; every pairing constructs a fresh one. The
/// binding must tolerate a candidate arriving before the descriptor
/// exchange completes by buffering it internally.
#[async_trait]
pub trait NegotiationSession: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn apply_remote(&mut self, desc: SessionDescription) -> Result<(), MediaError>;

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError>;

    /// Release transport and capture resources. Idempotent.
    async fn close(&mut self);
}
