//! Error types for call negotiation

use beckon_relay::EndpointId;
use thiserror::Error;

/// Malformed or out-of-order session description
///
/// Fatal to the session: it transitions to `Closed` and its resources are
/// released. No automatic retry.
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("Malformed session description: {0}")]
    Malformed(String),

    #[error("Description out of order: {0}")]
    OutOfOrder(String),
}

/// Malformed or premature transport candidate
///
/// Recoverable: the candidate is dropped and the session continues.
#[derive(Error, Debug)]
pub enum CandidateError {
    #[error("Malformed candidate: {0}")]
    Malformed(String),

    #[error("Incompatible candidate: {0}")]
    Incompatible(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session with {0} already in progress")]
    Busy(EndpointId),

    #[error("No active session with {0}")]
    NotFound(EndpointId),

    #[error("Media transport unavailable: {0}")]
    Media(String),

    #[error("Signaling channel error: {0}")]
    Channel(String),

    #[error("Signaling channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Description(#[from] DescriptionError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
