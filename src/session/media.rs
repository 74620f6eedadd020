//! Local media/transport capability boundary
//!
//! The real-time engine itself (capture, encoding, connectivity checks,
//! media transport) is a capability the embedding platform provides. The
//! negotiation state machine only ever touches it through these traits.

use async_trait::async_trait;
use beckon_relay::{IceCandidate, SdpKind, SessionDescription};
use tokio::sync::mpsc;

use super::error::{CandidateError, DescriptionError, SessionError};

/// Opaque handle to a remote media stream surfaced by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamHandle(pub String);

/// Asynchronous events surfaced by a media transport
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// A new local connectivity option was discovered
    LocalCandidate(IceCandidate),
    /// Remote media became available on the established path
    RemoteMedia(MediaStreamHandle),
}

/// One media transport per peer session
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Produce a local description with the given role
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> std::result::Result<SessionDescription, DescriptionError>;

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> std::result::Result<(), DescriptionError>;

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> std::result::Result<(), DescriptionError>;

    async fn add_remote_candidate(
        &self,
        candidate: &IceCandidate,
    ) -> std::result::Result<(), CandidateError>;

    /// Release the transport's resources; idempotent
    async fn close(&self);
}

/// Acquires local media/transport resources for new sessions
#[async_trait]
pub trait MediaFactory: Send + Sync {
    /// Open a transport for one session. Events the transport discovers
    /// asynchronously are delivered on `events`.
    async fn open(
        &self,
        events: mpsc::Sender<MediaEvent>,
    ) -> std::result::Result<Box<dyn MediaTransport>, SessionError>;
}
