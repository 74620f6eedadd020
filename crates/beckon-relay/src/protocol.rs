//! Signaling wire protocol shared by the relay and its clients
//!
//! Frames are JSON text messages. Clients address each other by the opaque
//! identifier the relay assigns at connect time; the relay tags every
//! forwarded frame with the sender's identifier so recipients never trust a
//! sender-supplied origin.

use serde::{Deserialize, Serialize};

/// Generate an opaque connection identifier
pub fn generate_endpoint_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..30)
        .map(|_| char::from_digit(rng.gen_range(0..36), 36).unwrap())
        .collect()
}

/// Opaque token addressing one live connection to the relay
///
/// Assigned by the relay when a client attaches, invalid as soon as the
/// connection closes. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn generate() -> Self {
        Self(generate_endpoint_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a session description in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// Negotiated-parameters blob, opaque except for its role tag
///
/// Field names follow the conventional WebRTC JSON encoding so payloads
/// produced by browser endpoints pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SdpKind, sdp: impl Into<String>) -> Self {
        Self { kind, sdp: sdp.into() }
    }
}

/// Opaque connectivity option trickled between endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Frames a client sends to the relay, addressed by recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "offer")]
    Offer {
        description: SessionDescription,
        to: EndpointId,
    },
    #[serde(rename = "answer")]
    Answer {
        description: SessionDescription,
        to: EndpointId,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: IceCandidate,
        to: EndpointId,
    },
}

impl ClientFrame {
    pub fn offer(description: SessionDescription, to: EndpointId) -> Self {
        ClientFrame::Offer { description, to }
    }

    pub fn answer(description: SessionDescription, to: EndpointId) -> Self {
        ClientFrame::Answer { description, to }
    }

    pub fn candidate(candidate: IceCandidate, to: EndpointId) -> Self {
        ClientFrame::IceCandidate { candidate, to }
    }

    pub fn msg_type(&self) -> &str {
        match self {
            ClientFrame::Offer { .. } => "offer",
            ClientFrame::Answer { .. } => "answer",
            ClientFrame::IceCandidate { .. } => "ice-candidate",
        }
    }

    pub fn recipient(&self) -> &EndpointId {
        match self {
            ClientFrame::Offer { to, .. } => to,
            ClientFrame::Answer { to, .. } => to,
            ClientFrame::IceCandidate { to, .. } => to,
        }
    }

    /// Rewrite into the delivered form, stamping the sender's identifier
    ///
    /// The origin always comes from the relay's own connection table, never
    /// from the sender's payload.
    pub fn tagged(self, from: EndpointId) -> ServerFrame {
        match self {
            ClientFrame::Offer { description, .. } => ServerFrame::Offer { description, from },
            ClientFrame::Answer { description, .. } => ServerFrame::Answer { description, from },
            ClientFrame::IceCandidate { candidate, .. } => {
                ServerFrame::IceCandidate { candidate, from }
            }
        }
    }
}

/// Frames the relay delivers to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Sent once on connect, carrying the identifier assigned to this
    /// connection
    #[serde(rename = "welcome")]
    Welcome { id: EndpointId },
    #[serde(rename = "offer")]
    Offer {
        description: SessionDescription,
        from: EndpointId,
    },
    #[serde(rename = "answer")]
    Answer {
        description: SessionDescription,
        from: EndpointId,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: IceCandidate,
        from: EndpointId,
    },
}

impl ServerFrame {
    pub fn welcome(id: EndpointId) -> Self {
        ServerFrame::Welcome { id }
    }

    pub fn msg_type(&self) -> &str {
        match self {
            ServerFrame::Welcome { .. } => "welcome",
            ServerFrame::Offer { .. } => "offer",
            ServerFrame::Answer { .. } => "answer",
            ServerFrame::IceCandidate { .. } => "ice-candidate",
        }
    }

    pub fn sender(&self) -> Option<&EndpointId> {
        match self {
            ServerFrame::Welcome { .. } => None,
            ServerFrame::Offer { from, .. } => Some(from),
            ServerFrame::Answer { from, .. } => Some(from),
            ServerFrame::IceCandidate { from, .. } => Some(from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_frame_format() {
        let desc = SessionDescription::new(SdpKind::Offer, "v=0\r\no=- 123 456 IN IP4 127.0.0.1\r\n");
        let frame = ClientFrame::offer(desc, "peer-b".into());
        let json = serde_json::to_string(&frame).unwrap();

        assert!(json.contains("\"type\":\"offer\""));
        assert!(json.contains("\"to\":\"peer-b\""));
        assert!(json.contains("\"sdp\""));

        let parsed: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.msg_type(), "offer");
        assert_eq!(parsed.recipient().as_str(), "peer-b");
    }

    #[test]
    fn test_candidate_frame_format() {
        let cand = IceCandidate {
            candidate: "candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let frame = ClientFrame::candidate(cand, "peer-a".into());
        let json = serde_json::to_string(&frame).unwrap();

        assert!(json.contains("\"type\":\"ice-candidate\""));
        assert!(json.contains("\"sdpMid\":\"0\""));
        assert!(json.contains("\"sdpMLineIndex\":0"));
        assert!(!json.contains("usernameFragment"));

        let parsed: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.msg_type(), "ice-candidate");
    }

    #[test]
    fn test_parse_browser_offer() {
        // The exact shape a browser client puts on the wire
        let raw = r#"{"type":"offer","description":{"type":"offer","sdp":"v=0\r\n"},"to":"abc123"}"#;
        let parsed: ClientFrame = serde_json::from_str(raw).unwrap();
        match parsed {
            ClientFrame::Offer { description, to } => {
                assert_eq!(description.kind, SdpKind::Offer);
                assert_eq!(to.as_str(), "abc123");
            }
            _ => panic!("Expected offer frame"),
        }
    }

    #[test]
    fn test_tagged_rewrites_origin_only() {
        let desc = SessionDescription::new(SdpKind::Answer, "v=0\r\n");
        let frame = ClientFrame::answer(desc.clone(), "peer-b".into());
        let delivered = frame.tagged("peer-a".into());

        match delivered {
            ServerFrame::Answer { description, from } => {
                assert_eq!(description, desc);
                assert_eq!(from.as_str(), "peer-a");
            }
            _ => panic!("Expected answer frame"),
        }
    }

    #[test]
    fn test_welcome_frame_format() {
        let frame = ServerFrame::welcome("xyz789".into());
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"welcome\""));
        assert!(json.contains("\"id\":\"xyz789\""));

        let parsed: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.msg_type(), "welcome");
        assert!(parsed.sender().is_none());
    }

    #[test]
    fn test_endpoint_id_generation() {
        let id1 = EndpointId::generate();
        let id2 = EndpointId::generate();

        assert_ne!(id1, id2);
        assert!(id1.as_str().len() >= 20);
        assert_eq!(id1.short().len(), 8);
    }
}
