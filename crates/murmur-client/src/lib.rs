//! Client core for murmur, an anonymous voice-chat pairing service.
//!
//! The controller behind [`Client`] turns the relay's asynchronous,
//! unordered signaling traffic into a single consistent session
//! lifecycle, drives a talk detector per party, and keeps a
//! session-scoped chat log. Audio capture and peer-to-peer media are
//! consumed through the capability traits in [`media`] — any binding
//! that satisfies them works, which is also how the state machine is
//! tested without real hardware.

pub mod chat;
pub mod config;
pub mod error;
pub mod media;
pub mod session;

pub(crate) mod detector;
pub(crate) mod transport;

pub use chat::{ChatEntry, ChatOrigin};
pub use config::{ClientConfig, IceServer};
pub use error::{ClientError, ConfigError, MediaError};
pub use media::{
    AudioSource, LinkState, MediaEngine, NegotiationSession, SessionEvent, SPECTRUM_BINS,
};
pub use session::{Client, ClientSnapshot, Preferences, Role, SessionPhase};

pub use murmur_protocol::{Gender, GenderFilter, IceCandidate, SdpKind, SessionDescription};
