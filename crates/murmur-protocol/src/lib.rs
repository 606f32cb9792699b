//! Signaling wire protocol shared by the murmur client and relay.
//!
//! Every frame on the relay channel is a JSON object tagged by `type`.
//! The relay only interprets the matchmaking messages (`find_match`,
//! `skip`); negotiation and chat payloads are forwarded to the partner
//! verbatim. Field names follow the browser conventions the media layer
//! expects (`sdpMid`, `sdpMLineIndex`), so a web peer can sit on the
//! other end of a pairing unchanged.

use serde::{Deserialize, Serialize};

/// A signaling frame, client ↔ relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Client → relay: enter the matchmaking queue.
    FindMatch {
        interests: Vec<String>,
        gender_pref: GenderFilter,
        user_gender: Gender,
    },

    /// Client → relay: abandon the current pairing and re-enter the queue.
    /// Carries the same preference snapshot as `find_match`.
    Skip {
        interests: Vec<String>,
        gender_pref: GenderFilter,
        user_gender: Gender,
    },

    /// Relay → client: greeting after the channel is accepted.
    Connected {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Relay → client: still queued, no partner yet.
    Waiting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Relay → client: a pairing was assigned. `is_initiator` decides who
    /// produces the negotiation offer.
    MatchFound {
        partner_id: String,
        is_initiator: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Negotiation offer, forwarded between partners.
    Offer {
        data: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Negotiation answer, forwarded between partners.
    Answer {
        data: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Connectivity candidate, forwarded between partners.
    IceCandidate {
        data: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Relay → client: the partner left or lost its channel.
    PartnerDisconnected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Text chat line, forwarded between partners. Best-effort, no ack.
    ChatMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Relay → client: number of clients currently online.
    OnlineCount {
        count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

/// Self-reported gender, sent with every matchmaking request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Who the user wants to be paired with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    #[default]
    Any,
    Male,
    Female,
}

impl GenderFilter {
    /// Whether a partner of the given gender passes this filter.
    pub fn accepts(&self, gender: Gender) -> bool {
        match self {
            GenderFilter::Any => true,
            GenderFilter::Male => gender == Gender::Male,
            GenderFilter::Female => gender == Gender::Female,
        }
    }
}

/// A negotiation descriptor (offer or answer) produced by one side's media
/// stack and applied by the other's. The `sdp` body is opaque here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A connectivity candidate. Field names are the browser's, so candidates
/// survive a round trip through a web peer untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_match_wire_shape() {
        let msg = SignalMessage::FindMatch {
            interests: vec!["music".into(), "films".into()],
            gender_pref: GenderFilter::Any,
            user_gender: Gender::Female,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "find_match");
        assert_eq!(json["gender_pref"], "any");
        assert_eq!(json["user_gender"], "female");
        assert_eq!(json["interests"][1], "films");
    }

    #[test]
    fn match_found_parses_relay_frame() {
        let json = r#"{
            "type": "match_found",
            "partner_id": "user_ab12cd34e",
            "is_initiator": true,
            "timestamp": "2026-08-06T12:00:00"
        }"#;
        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            SignalMessage::MatchFound {
                partner_id: "user_ab12cd34e".into(),
                is_initiator: true,
                timestamp: Some("2026-08-06T12:00:00".into()),
            }
        );
    }

    #[test]
    fn candidate_uses_browser_field_names() {
        let msg = SignalMessage::IceCandidate {
            data: IceCandidate {
                candidate: "candidate:1 1 udp 2113937151 192.0.2.7 50000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            },
            from: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["data"]["sdpMid"], "0");
        assert_eq!(json["data"]["sdpMLineIndex"], 0);
        assert!(json["data"].get("sdp_mid").is_none());

        let back: SignalMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn offer_nests_descriptor_under_data() {
        let json = r#"{
            "type": "offer",
            "data": {"type": "offer", "sdp": "v=0\r\n"},
            "from": "user_x"
        }"#;
        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        match msg {
            SignalMessage::Offer { data, from } => {
                assert_eq!(data.kind, SdpKind::Offer);
                assert_eq!(data.sdp, "v=0\r\n");
                assert_eq!(from.as_deref(), Some("user_x"));
            }
            other => panic!("expected offer, got {other:?}"),
        }
    }

    #[test]
    fn waiting_message_is_optional() {
        let msg: SignalMessage = serde_json::from_str(r#"{"type": "waiting"}"#).unwrap();
        assert_eq!(
            msg,
            SignalMessage::Waiting {
                message: None,
                timestamp: None,
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = serde_json::from_str::<SignalMessage>(r#"{"type": "reboot"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn gender_filter_accepts() {
        assert!(GenderFilter::Any.accepts(Gender::Male));
        assert!(GenderFilter::Any.accepts(Gender::Female));
        assert!(GenderFilter::Female.accepts(Gender::Female));
        assert!(!GenderFilter::Female.accepts(Gender::Male));
        assert!(!GenderFilter::Male.accepts(Gender::Female));
    }
}
