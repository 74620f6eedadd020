//! Per-peer negotiation state
//!
//! A `PeerSession` owns the local description, the remote description and
//! the queue of remote candidates that arrived before the remote
//! description was set. All mutation happens from the manager's event loop,
//! one event at a time.

use std::time::Instant;

use beckon_relay::{EndpointId, IceCandidate, SdpKind, SessionDescription};
use tracing::{debug, warn};

use super::error::DescriptionError;
use super::media::MediaTransport;
use super::types::{Role, SessionState, SessionStatus};

pub struct PeerSession {
    remote: EndpointId,
    role: Role,
    state: SessionState,
    transport: Box<dyn MediaTransport>,
    local_desc: Option<SessionDescription>,
    remote_desc: Option<SessionDescription>,
    /// Remote candidates waiting for the remote description.
    /// Non-empty only while `remote_desc` is unset; drained exactly once.
    pending: Vec<IceCandidate>,
    created_at: Instant,
}

impl PeerSession {
    pub fn new(remote: EndpointId, role: Role, transport: Box<dyn MediaTransport>) -> Self {
        Self {
            remote,
            role,
            state: SessionState::Idle,
            transport,
            local_desc: None,
            remote_desc: None,
            pending: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn remote(&self) -> &EndpointId {
        &self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        self.state != SessionState::Closed
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            remote: self.remote.clone(),
            role: self.role,
            state: self.state,
        }
    }

    /// Pre-seed the candidate queue with candidates that arrived before
    /// this session existed
    pub fn seed_pending(&mut self, candidates: Vec<IceCandidate>) {
        self.pending.extend(candidates);
    }

    /// Caller path: produce the local offer and record it
    pub async fn start_offer(&mut self) -> Result<SessionDescription, DescriptionError> {
        self.state = SessionState::Negotiating;
        let offer = self.transport.create_local_description(SdpKind::Offer).await?;
        self.transport.set_local_description(&offer).await?;
        self.local_desc = Some(offer.clone());
        Ok(offer)
    }

    /// Callee path: apply a remote offer and produce the local answer
    ///
    /// Returns `None` when the remote description is already set; a
    /// duplicate or stale offer must not disturb a converged session.
    pub async fn apply_offer(
        &mut self,
        description: SessionDescription,
    ) -> Result<Option<SessionDescription>, DescriptionError> {
        if self.remote_desc.is_some() {
            debug!(
                "Remote description already set for {}, offer ignored",
                self.remote.short()
            );
            return Ok(None);
        }
        if description.kind != SdpKind::Offer {
            return Err(DescriptionError::OutOfOrder(format!(
                "expected offer, got {}",
                description.kind
            )));
        }

        self.state = SessionState::Negotiating;
        self.transport.set_remote_description(&description).await?;
        self.remote_desc = Some(description);
        self.drain_pending().await;

        let answer = self.transport.create_local_description(SdpKind::Answer).await?;
        self.transport.set_local_description(&answer).await?;
        self.local_desc = Some(answer.clone());

        // Both descriptions are set: negotiation has converged
        self.state = SessionState::Connected;
        Ok(Some(answer))
    }

    /// Caller completes: apply the remote answer
    ///
    /// Returns `false` when the remote description is already set (duplicate
    /// answer delivery); the converged description pair is left untouched.
    pub async fn apply_answer(
        &mut self,
        description: SessionDescription,
    ) -> Result<bool, DescriptionError> {
        if self.remote_desc.is_some() {
            debug!(
                "Remote description already set for {}, answer ignored",
                self.remote.short()
            );
            return Ok(false);
        }
        if self.role != Role::Caller {
            return Err(DescriptionError::OutOfOrder(
                "answer received on callee side".to_string(),
            ));
        }
        if description.kind != SdpKind::Answer {
            return Err(DescriptionError::OutOfOrder(format!(
                "expected answer, got {}",
                description.kind
            )));
        }

        self.transport.set_remote_description(&description).await?;
        self.remote_desc = Some(description);
        self.drain_pending().await;
        self.state = SessionState::Connected;
        Ok(true)
    }

    /// Apply a remote candidate now, or queue it until the remote
    /// description is set. A candidate the transport rejects is dropped;
    /// the session continues.
    pub async fn apply_candidate(&mut self, candidate: IceCandidate) {
        if self.remote_desc.is_some() {
            if let Err(e) = self.transport.add_remote_candidate(&candidate).await {
                warn!("Dropping candidate from {}: {}", self.remote.short(), e);
            }
        } else {
            self.pending.push(candidate);
        }
    }

    /// Drain queued candidates in arrival order, exactly once
    async fn drain_pending(&mut self) {
        for candidate in std::mem::take(&mut self.pending) {
            if let Err(e) = self.transport.add_remote_candidate(&candidate).await {
                warn!(
                    "Dropping queued candidate from {}: {}",
                    self.remote.short(),
                    e
                );
            }
        }
    }

    /// Release transport resources. Terminal; the session is not reused.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.pending.clear();
        self.transport.close().await;
        self.state = SessionState::Closed;
    }
}
