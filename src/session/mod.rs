//! Pairwise call negotiation over a signaling relay
//!
//! One [`SessionManager`] per endpoint, one [`PeerSession`] per remote
//! peer. The manager exchanges offer/answer/candidate frames through an
//! owned signaling channel and drives each session to a single agreed
//! description pair, buffering candidates that arrive before they can be
//! applied.

mod channel;
pub mod error;
mod manager;
mod media;
mod peer;
mod types;


pub use channel::SignalChannel;
pub use error::{CandidateError, DescriptionError, SessionError};
pub use manager::{SessionHandle, SessionManager, SessionTable};
pub use media::{MediaEvent, MediaFactory, MediaStreamHandle, MediaTransport};
pub use peer::PeerSession;
pub use types::{CloseReason, Role, SessionConfig, SessionEvent, SessionState, SessionStatus};
