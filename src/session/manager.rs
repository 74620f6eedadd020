//! Session manager: one event loop per endpoint
//!
//! Inbound relay frames, media-transport events, user commands and the
//! timeout sweep are all arms of a single select loop, so no two events
//! ever mutate the same session concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beckon_relay::{ClientFrame, EndpointId, IceCandidate, ServerFrame, SessionDescription};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::{debug, error, info, warn};

use super::error::{Result, SessionError};
use super::media::{MediaEvent, MediaFactory};
use super::peer::PeerSession;
use super::types::{CloseReason, Role, SessionConfig, SessionEvent, SessionState, SessionStatus};

/// Candidates buffered for a remote identifier with no session yet
const EARLY_QUEUE_MAX: usize = 64;

const CHANNEL_CAPACITY: usize = 100;

/// Commands accepted from the embedding application
enum Command {
    Call {
        remote: EndpointId,
        reply: oneshot::Sender<Result<()>>,
    },
    Hangup {
        remote: EndpointId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// The transport layer observed the remote endpoint's departure
    PeerDisconnected { remote: EndpointId },
}

/// Shared state observers may read
pub struct SessionTable {
    /// Identifier the relay assigned to this endpoint, once known
    pub local_id: RwLock<Option<EndpointId>>,
    pub sessions: RwLock<HashMap<EndpointId, PeerSession>>,
}

impl SessionTable {
    fn new() -> Self {
        Self {
            local_id: RwLock::new(None),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// Cheap clone-able handle for driving a running manager
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<SessionTable>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Start a call to `remote`. Rejected when a session with that
    /// endpoint is already negotiating or connected.
    pub async fn call(&self, remote: EndpointId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Call { remote, reply: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// End the call with `remote` and release its resources
    pub async fn hangup(&self, remote: EndpointId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Hangup { remote, reply: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Feed a transport-layer disconnect observation into the state machine
    pub async fn peer_disconnected(&self, remote: EndpointId) {
        let _ = self.commands.send(Command::PeerDisconnected { remote }).await;
    }

    /// Signal shutdown; the manager closes every session and returns
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// The identifier the relay assigned to this endpoint, if known yet
    pub async fn local_id(&self) -> Option<EndpointId> {
        self.state.local_id.read().await.clone()
    }

    pub async fn statuses(&self) -> Vec<SessionStatus> {
        self.state
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.status())
            .collect()
    }

    pub async fn session_state(&self, remote: &EndpointId) -> Option<SessionState> {
        self.state
            .sessions
            .read()
            .await
            .get(remote)
            .map(|s| s.state())
    }
}

/// Per-endpoint negotiation driver
///
/// Construct with an explicit signaling channel pair (no global socket
/// state), then spawn [`SessionManager::run`].
pub struct SessionManager {
    config: SessionConfig,
    factory: Arc<dyn MediaFactory>,
    state: Arc<SessionTable>,
    outbound: mpsc::Sender<ClientFrame>,
    inbound: Option<mpsc::Receiver<ServerFrame>>,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: Option<mpsc::Receiver<Command>>,
    media_tx: mpsc::Sender<(EndpointId, MediaEvent)>,
    media_rx: Option<mpsc::Receiver<(EndpointId, MediaEvent)>>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Option<mpsc::Receiver<SessionEvent>>,
    /// Candidates that arrived before any session existed for their sender
    early: HashMap<EndpointId, Vec<IceCandidate>>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionManager {
    pub fn new(
        outbound: mpsc::Sender<ClientFrame>,
        inbound: mpsc::Receiver<ServerFrame>,
        factory: Arc<dyn MediaFactory>,
        config: SessionConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (commands_tx, commands_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (media_tx, media_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);

        Self {
            config,
            factory,
            state: Arc::new(SessionTable::new()),
            outbound,
            inbound: Some(inbound),
            commands_tx,
            commands_rx: Some(commands_rx),
            media_tx,
            media_rx: Some(media_rx),
            events_tx,
            events_rx: Some(events_rx),
            early: HashMap::new(),
            shutdown: Arc::new(shutdown),
            shutdown_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Take the notification stream. Call once, before `run`.
    pub fn events(&mut self) -> mpsc::Receiver<SessionEvent> {
        self.events_rx.take().expect("events receiver already taken")
    }

    /// Get shared state for external access
    pub fn state(&self) -> Arc<SessionTable> {
        self.state.clone()
    }

    /// Drive all sessions until shutdown or loss of the signaling channel
    pub async fn run(&mut self) -> Result<()> {
        let mut inbound = self.inbound.take().expect("inbound receiver already taken");
        let mut commands = self.commands_rx.take().expect("commands receiver already taken");
        let mut media = self.media_rx.take().expect("media receiver already taken");
        let mut sweep =
            tokio::time::interval(Duration::from_millis(self.config.sweep_interval_ms));
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Session manager shutting down");
                        self.close_all(CloseReason::Shutdown).await;
                        return Ok(());
                    }
                }
                maybe_frame = inbound.recv() => {
                    match maybe_frame {
                        Some(frame) => self.handle_frame(frame).await,
                        None => {
                            warn!("Signaling channel closed, ending all sessions");
                            self.close_all(CloseReason::ChannelLost).await;
                            return Err(SessionError::ChannelClosed);
                        }
                    }
                }
                Some(cmd) = commands.recv() => {
                    self.handle_command(cmd).await;
                }
                Some((remote, event)) = media.recv() => {
                    self.handle_media_event(remote, event).await;
                }
                _ = sweep.tick() => {
                    self.sweep_timeouts().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Call { remote, reply } => self.handle_call(remote, reply).await,
            Command::Hangup { remote, reply } => {
                let closed = self.close_session(&remote, CloseReason::Hangup).await;
                let _ = reply.send(if closed {
                    Ok(())
                } else {
                    Err(SessionError::NotFound(remote))
                });
            }
            Command::PeerDisconnected { remote } => {
                if self.close_session(&remote, CloseReason::PeerDisconnected).await {
                    info!("Session with {} ended: peer disconnected", remote.short());
                }
            }
        }
    }

    async fn handle_call(&mut self, remote: EndpointId, reply: oneshot::Sender<Result<()>>) {
        let busy = self
            .state
            .sessions
            .read()
            .await
            .get(&remote)
            .map(|s| s.is_active())
            .unwrap_or(false);
        if busy {
            let _ = reply.send(Err(SessionError::Busy(remote)));
            return;
        }

        info!("Calling {}", remote.short());

        let mut session = match self.open_session(remote.clone(), Role::Caller).await {
            Ok(s) => s,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        if let Some(cands) = self.early.remove(&remote) {
            session.seed_pending(cands);
        }

        match session.start_offer().await {
            Ok(offer) => {
                self.state
                    .sessions
                    .write()
                    .await
                    .insert(remote.clone(), session);
                if self
                    .outbound
                    .send(ClientFrame::offer(offer, remote.clone()))
                    .await
                    .is_err()
                {
                    warn!(
                        "Signaling channel closed, could not send offer to {}",
                        remote.short()
                    );
                    self.close_session(&remote, CloseReason::ChannelLost).await;
                    let _ = reply.send(Err(SessionError::ChannelClosed));
                    return;
                }
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                error!("Failed to produce offer for {}: {}", remote.short(), e);
                session.close().await;
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    async fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Welcome { id } => {
                info!("Assigned endpoint id {}", id.short());
                *self.state.local_id.write().await = Some(id);
            }
            ServerFrame::Offer { description, from } => {
                self.handle_offer(from, description).await;
            }
            ServerFrame::Answer { description, from } => {
                self.handle_answer(from, description).await;
            }
            ServerFrame::IceCandidate { candidate, from } => {
                self.handle_candidate(from, candidate).await;
            }
        }
    }

    async fn handle_offer(&mut self, from: EndpointId, description: SessionDescription) {
        {
            let sessions = self.state.sessions.read().await;
            if let Some(existing) = sessions.get(&from) {
                if existing.is_active() {
                    // A second offer never disturbs a live session
                    match existing.role() {
                        Role::Caller => warn!(
                            "Offer from {} while calling them (glare), ignored",
                            from.short()
                        ),
                        Role::Callee => {
                            debug!("Duplicate offer from {}, ignored", from.short())
                        }
                    }
                    return;
                }
            }
        }

        info!("Incoming call from {}", from.short());

        let mut session = match self.open_session(from.clone(), Role::Callee).await {
            Ok(s) => s,
            Err(e) => {
                error!(
                    "Failed to acquire media for call from {}: {}",
                    from.short(),
                    e
                );
                return;
            }
        };
        if let Some(cands) = self.early.remove(&from) {
            debug!(
                "Seeding {} early candidate(s) from {}",
                cands.len(),
                from.short()
            );
            session.seed_pending(cands);
        }

        match session.apply_offer(description).await {
            Ok(Some(answer)) => {
                self.state
                    .sessions
                    .write()
                    .await
                    .insert(from.clone(), session);
                if self
                    .outbound
                    .send(ClientFrame::answer(answer, from.clone()))
                    .await
                    .is_err()
                {
                    warn!(
                        "Signaling channel closed, could not send answer to {}",
                        from.short()
                    );
                    self.close_session(&from, CloseReason::ChannelLost).await;
                    return;
                }
                info!("Answered call from {}", from.short());
                self.emit(SessionEvent::Connected { remote: from });
            }
            Ok(None) => {
                // A fresh session has no remote description; nothing to do
                session.close().await;
            }
            Err(e) => {
                error!("Failed to apply offer from {}: {}", from.short(), e);
                session.close().await;
            }
        }
    }

    async fn handle_answer(&mut self, from: EndpointId, description: SessionDescription) {
        let applied = {
            let mut sessions = self.state.sessions.write().await;
            match sessions.get_mut(&from) {
                None => {
                    debug!("Answer from {} with no active session, ignored", from.short());
                    return;
                }
                Some(session) => session.apply_answer(description).await,
            }
        };

        match applied {
            Ok(true) => {
                info!("Call with {} connected", from.short());
                self.emit(SessionEvent::Connected { remote: from });
            }
            Ok(false) => {}
            Err(e) => {
                error!("Fatal description error from {}: {}", from.short(), e);
                self.close_session(&from, CloseReason::DescriptionFailed).await;
            }
        }
    }

    async fn handle_candidate(&mut self, from: EndpointId, candidate: IceCandidate) {
        {
            let mut sessions = self.state.sessions.write().await;
            if let Some(session) = sessions.get_mut(&from) {
                if session.is_active() {
                    session.apply_candidate(candidate).await;
                    return;
                }
            }
        }

        // No session yet: hold the candidate until an offer creates one
        let queue = self.early.entry(from.clone()).or_default();
        if queue.len() >= EARLY_QUEUE_MAX {
            warn!("Early candidate queue full for {}, dropping", from.short());
            return;
        }
        debug!("Buffering early candidate from {}", from.short());
        queue.push(candidate);
    }

    async fn handle_media_event(&mut self, remote: EndpointId, event: MediaEvent) {
        match event {
            MediaEvent::LocalCandidate(candidate) => {
                let active = self
                    .state
                    .sessions
                    .read()
                    .await
                    .get(&remote)
                    .map(|s| s.is_active())
                    .unwrap_or(false);
                if !active {
                    debug!(
                        "Local candidate for closed session {}, dropped",
                        remote.short()
                    );
                    return;
                }
                // Trickle: forward each candidate the moment it surfaces
                if self
                    .outbound
                    .send(ClientFrame::candidate(candidate, remote.clone()))
                    .await
                    .is_err()
                {
                    warn!(
                        "Signaling channel closed, candidate for {} dropped",
                        remote.short()
                    );
                }
            }
            MediaEvent::RemoteMedia(stream) => {
                self.emit(SessionEvent::RemoteMedia { remote, stream });
            }
        }
    }

    async fn sweep_timeouts(&mut self) {
        let timeout = Duration::from_millis(self.config.negotiation_timeout_ms);
        let expired: Vec<EndpointId> = self
            .state
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| {
                s.state() == SessionState::Negotiating && s.created_at().elapsed() >= timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for remote in expired {
            warn!("Negotiation with {} timed out", remote.short());
            self.close_session(&remote, CloseReason::Timeout).await;
        }
    }

    /// Create the session's transport, wiring its events back into this
    /// manager's loop tagged with the remote identifier
    async fn open_session(
        &self,
        remote: EndpointId,
        role: Role,
    ) -> Result<PeerSession> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let media_tx = self.media_tx.clone();
        let tag = remote.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if media_tx.send((tag.clone(), event)).await.is_err() {
                    break;
                }
            }
        });

        let transport = self.factory.open(tx).await?;
        Ok(PeerSession::new(remote, role, transport))
    }

    /// Destroy the session for `remote`, if any. Returns whether one
    /// existed.
    async fn close_session(&mut self, remote: &EndpointId, reason: CloseReason) -> bool {
        self.early.remove(remote);
        let session = self.state.sessions.write().await.remove(remote);
        match session {
            Some(mut session) => {
                session.close().await;
                self.emit(SessionEvent::Closed {
                    remote: remote.clone(),
                    reason,
                });
                true
            }
            None => false,
        }
    }

    async fn close_all(&mut self, reason: CloseReason) {
        self.early.clear();
        let drained: Vec<(EndpointId, PeerSession)> =
            self.state.sessions.write().await.drain().collect();
        for (remote, mut session) in drained {
            session.close().await;
            self.emit(SessionEvent::Closed { remote, reason });
        }
    }

    /// Best-effort notification; observers that stop reading lose events
    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!("Dropping session event: {}", e);
        }
    }
}
