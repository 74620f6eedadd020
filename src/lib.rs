pub mod config;
pub mod session;

pub use beckon_relay::{
    ws_handler, ClientFrame, EndpointId, IceCandidate, RelayState, SdpKind, ServerFrame,
    SessionDescription,
};
pub use config::Config;
pub use session::{
    CloseReason, MediaEvent, MediaFactory, MediaStreamHandle, MediaTransport, SessionConfig,
    SessionEvent, SessionHandle, SessionManager, SessionState, SignalChannel,
};
