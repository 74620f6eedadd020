//! Session-level types

use beckon_relay::EndpointId;

use super::media::MediaStreamHandle;

/// Which side of the negotiation this session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Caller => write!(f, "caller"),
            Role::Callee => write!(f, "callee"),
        }
    }
}

/// Lifecycle state of a peer session
///
/// `Closed` is terminal; sessions are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit local end-call
    Hangup,
    /// The remote endpoint's connection went away
    PeerDisconnected,
    /// No answer arrived within the negotiation timeout
    Timeout,
    /// A fatal description error
    DescriptionFailed,
    /// The channel to the relay was lost
    ChannelLost,
    /// The manager is shutting down
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Hangup => write!(f, "hangup"),
            CloseReason::PeerDisconnected => write!(f, "peer disconnected"),
            CloseReason::Timeout => write!(f, "negotiation timeout"),
            CloseReason::DescriptionFailed => write!(f, "description failed"),
            CloseReason::ChannelLost => write!(f, "signaling channel lost"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Notifications the manager emits to the embedding application
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Negotiation converged; both descriptions are set
    Connected { remote: EndpointId },
    /// The transport surfaced remote media for this session
    RemoteMedia {
        remote: EndpointId,
        stream: MediaStreamHandle,
    },
    /// The session was torn down
    Closed {
        remote: EndpointId,
        reason: CloseReason,
    },
}

/// Point-in-time view of one session, for observers
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub remote: EndpointId,
    pub role: Role,
    pub state: SessionState,
}

/// Runtime knobs for the session manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session may sit in `Negotiating` before it is closed
    pub negotiation_timeout_ms: u64,
    /// How often the timeout sweep runs
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout_ms: 30_000,
            sweep_interval_ms: 1_000,
        }
    }
}
