//! Signaling relay for pairwise call setup
//!
//! This crate provides both:
//! - The wire protocol spoken between endpoints and the relay
//! - The relay server itself: a stateless fan-out switch that forwards
//!   signaling frames between live connections without inspecting them

pub mod protocol;
mod server;

pub use protocol::{
    ClientFrame, EndpointId, IceCandidate, SdpKind, ServerFrame, SessionDescription,
};
pub use server::{ws_handler, RelayState};
