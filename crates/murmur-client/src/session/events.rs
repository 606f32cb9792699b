//! Event types flowing into the controller loop.

use std::sync::Arc;

use murmur_protocol::{Gender, GenderFilter, IceCandidate, SessionDescription, SignalMessage};

use crate::error::MediaError;
use crate::media::{AudioSource, LinkState};
use crate::transport::TransportEvent;

/// User-initiated actions, sent by the [`Client`](super::Client) handle.
#[derive(Debug)]
pub(crate) enum UserAction {
    Start,
    Skip,
    End,
    ToggleMute,
    SendChat(String),
    SetInterests(Vec<String>),
    SetGender(Gender),
    SetGenderFilter(GenderFilter),
}

/// Which party an activity signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Party {
    Local,
    Remote,
}

/// Results of asynchronous per-pairing work re-entering the loop.
///
/// Every variant carries the epoch of the pairing it was spawned under;
/// the controller discards events whose epoch is no longer current, so a
/// torn-down pairing can never mutate its successor.
pub(crate) enum InternalEvent {
    /// Microphone acquired; the capture source is shared with the local
    /// talk detector.
    CaptureReady {
        epoch: u64,
        source: Arc<dyn AudioSource>,
    },
    /// Microphone acquisition failed (permission error).
    CaptureFailed { epoch: u64, error: MediaError },
    /// Opening the negotiation session or producing the offer failed.
    PairingFailed { epoch: u64, error: MediaError },
    /// Negotiation traffic the driver wants forwarded to the peer.
    Outbound { epoch: u64, message: SignalMessage },
    /// The peer's audio stream became available.
    RemoteStream {
        epoch: u64,
        source: Arc<dyn AudioSource>,
    },
    /// Direct media path state change.
    Link { epoch: u64, state: LinkState },
    /// A talk detector's boolean flipped.
    Talking {
        epoch: u64,
        party: Party,
        active: bool,
    },
    /// The two-second match celebration elapsed.
    CelebrationOver { epoch: u64 },
}

/// Everything except user actions, in one ordered stream.
pub(crate) enum ControlEvent {
    Transport {
        link: u64,
        event: TransportEvent,
    },
    Internal(InternalEvent),
}

/// Inbound negotiation messages routed to the current pairing's driver.
#[derive(Debug)]
pub(crate) enum DriverCommand {
    RemoteOffer(SessionDescription),
    RemoteAnswer(SessionDescription),
    RemoteCandidate(IceCandidate),
}
