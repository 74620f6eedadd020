//! E2E tests: two session managers negotiating through a real relay
//!
//! Each endpoint runs a full manager over a live WebSocket connection; the
//! media engine is a recording stub that produces deterministic
//! descriptions and, where configured, trickles scripted local candidates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beckon::session::{
    MediaEvent, MediaFactory, MediaTransport, SessionConfig, SessionError, SessionHandle,
    SessionManager, SignalChannel,
};
use beckon::{
    ws_handler, ClientFrame, EndpointId, IceCandidate, RelayState, SdpKind, ServerFrame,
    SessionDescription, SessionState,
};
use beckon::session::{CandidateError, DescriptionError};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// What one stub transport saw
#[derive(Clone, Default)]
struct Recorded {
    remote_descriptions: Arc<Mutex<Vec<SessionDescription>>>,
    candidates: Arc<Mutex<Vec<IceCandidate>>>,
}

struct StubTransport {
    label: String,
    rec: Recorded,
}

#[async_trait]
impl MediaTransport for StubTransport {
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, DescriptionError> {
        Ok(SessionDescription::new(
            kind,
            format!("v=0 {} from {}", kind, self.label),
        ))
    }

    async fn set_local_description(
        &self,
        _description: &SessionDescription,
    ) -> Result<(), DescriptionError> {
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), DescriptionError> {
        self.rec
            .remote_descriptions
            .lock()
            .unwrap()
            .push(description.clone());
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), CandidateError> {
        self.rec.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) {}
}

struct StubFactory {
    label: String,
    /// Local candidates to trickle shortly after the transport opens
    local_candidates: Vec<String>,
    opened: Arc<Mutex<Vec<Recorded>>>,
}

impl StubFactory {
    fn new(label: &str, local_candidates: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            local_candidates: local_candidates.iter().map(|s| s.to_string()).collect(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MediaFactory for StubFactory {
    async fn open(
        &self,
        events: mpsc::Sender<MediaEvent>,
    ) -> Result<Box<dyn MediaTransport>, SessionError> {
        let rec = Recorded::default();
        self.opened.lock().unwrap().push(rec.clone());

        let candidates = self.local_candidates.clone();
        tokio::spawn(async move {
            for payload in candidates {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if events
                    .send(MediaEvent::LocalCandidate(IceCandidate::new(payload)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Box::new(StubTransport {
            label: self.label.clone(),
            rec,
        }))
    }
}

async fn start_relay() -> String {
    let state = RelayState::new();
    let app = axum::Router::new()
        .route("/", axum::routing::any(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Connect a manager to the relay and wait for its assigned identifier
async fn start_endpoint(
    relay_addr: &str,
    factory: StubFactory,
) -> (SessionHandle, Arc<Mutex<Vec<Recorded>>>, EndpointId) {
    let opened = factory.opened.clone();
    let channel = SignalChannel::connect(&format!("ws://{}", relay_addr))
        .await
        .expect("Failed to connect to relay");

    let mut manager = SessionManager::new(
        channel.outbound,
        channel.inbound,
        Arc::new(factory),
        SessionConfig::default(),
    );
    let handle = manager.handle();
    let mut events = manager.events();
    tokio::spawn(async move { while events.recv().await.is_some() {} });
    tokio::spawn(async move {
        let _ = manager.run().await;
    });

    let mut local_id = None;
    for _ in 0..100 {
        if let Some(id) = handle.local_id().await {
            local_id = Some(id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let local_id = local_id.expect("Relay never assigned an identifier");
    (handle, opened, local_id)
}

async fn wait_for_connected(handle: &SessionHandle, remote: &EndpointId) {
    for _ in 0..100 {
        if handle.session_state(remote).await == Some(SessionState::Connected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Session with {} never reached connected", remote);
}

#[tokio::test]
async fn test_call_connects_both_endpoints() {
    let relay = start_relay().await;

    let (alice, alice_opened, alice_id) = start_endpoint(&relay, StubFactory::new("alice", &[])).await;
    let (bob, bob_opened, bob_id) = start_endpoint(&relay, StubFactory::new("bob", &[])).await;
    assert_ne!(alice_id, bob_id);

    alice.call(bob_id.clone()).await.unwrap();

    wait_for_connected(&alice, &bob_id).await;
    wait_for_connected(&bob, &alice_id).await;

    // Bob saw exactly Alice's offer; Alice saw exactly Bob's answer
    let bob_rec = bob_opened.lock().unwrap()[0].clone();
    let bob_seen = bob_rec.remote_descriptions.lock().unwrap().clone();
    assert_eq!(bob_seen.len(), 1);
    assert_eq!(bob_seen[0].kind, SdpKind::Offer);
    assert_eq!(bob_seen[0].sdp, "v=0 offer from alice");

    let alice_rec = alice_opened.lock().unwrap()[0].clone();
    let alice_seen = alice_rec.remote_descriptions.lock().unwrap().clone();
    assert_eq!(alice_seen.len(), 1);
    assert_eq!(alice_seen[0].kind, SdpKind::Answer);
    assert_eq!(alice_seen[0].sdp, "v=0 answer from bob");
}

#[tokio::test]
async fn test_candidates_trickle_end_to_end() {
    let relay = start_relay().await;

    let (alice, alice_opened, alice_id) = start_endpoint(
        &relay,
        StubFactory::new("alice", &["candidate:a1 trickle", "candidate:a2 trickle"]),
    )
    .await;
    let (bob, bob_opened, bob_id) =
        start_endpoint(&relay, StubFactory::new("bob", &["candidate:b1 trickle"])).await;

    alice.call(bob_id.clone()).await.unwrap();
    wait_for_connected(&alice, &bob_id).await;
    wait_for_connected(&bob, &alice_id).await;

    // Payloads arrive unmodified, in the order they were discovered
    let mut ok = false;
    for _ in 0..100 {
        let bob_rec = bob_opened.lock().unwrap()[0].clone();
        let alice_rec = alice_opened.lock().unwrap()[0].clone();
        let bob_got: Vec<String> = bob_rec
            .candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.clone())
            .collect();
        let alice_got: Vec<String> = alice_rec
            .candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.clone())
            .collect();
        if bob_got == ["candidate:a1 trickle", "candidate:a2 trickle"]
            && alice_got == ["candidate:b1 trickle"]
        {
            ok = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(ok, "Candidates did not round-trip in order");
}

#[tokio::test]
async fn test_candidates_before_offer_are_tolerated() {
    let relay = start_relay().await;

    // Bob is a real endpoint; Alice is a raw client so we control ordering
    let (bob, bob_opened, bob_id) = start_endpoint(&relay, StubFactory::new("bob", &[])).await;

    let url = format!("ws://{}", relay);
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();

    let welcome = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Timeout waiting for welcome")
        .unwrap()
        .unwrap();
    let alice_id = match serde_json::from_str(welcome.to_text().unwrap()).unwrap() {
        ServerFrame::Welcome { id } => id,
        other => panic!("Expected welcome, got {:?}", other),
    };

    // Candidates racing ahead of the offer: not expected, must be tolerated
    for i in 0..3 {
        let frame = ClientFrame::candidate(
            IceCandidate::new(format!("candidate:{} race", i)),
            bob_id.clone(),
        );
        write
            .send(Message::Text(serde_json::to_string(&frame).unwrap()))
            .await
            .unwrap();
    }
    let offer = ClientFrame::offer(
        SessionDescription::new(SdpKind::Offer, "v=0 racing offer"),
        bob_id.clone(),
    );
    write
        .send(Message::Text(serde_json::to_string(&offer).unwrap()))
        .await
        .unwrap();

    // Bob answers the offer
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Timeout waiting for answer")
        .unwrap()
        .unwrap();
    match serde_json::from_str(msg.to_text().unwrap()).unwrap() {
        ServerFrame::Answer { description, from } => {
            assert_eq!(description.kind, SdpKind::Answer);
            assert_eq!(from, bob_id);
        }
        other => panic!("Expected answer, got {:?}", other),
    }

    // All three raced candidates were queued, then drained in order the
    // instant the offer was processed
    let bob_rec = bob_opened.lock().unwrap()[0].clone();
    let applied: Vec<String> = bob_rec
        .candidates
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.candidate.clone())
        .collect();
    assert_eq!(
        applied,
        ["candidate:0 race", "candidate:1 race", "candidate:2 race"]
    );
    assert_eq!(
        bob.session_state(&alice_id).await,
        Some(SessionState::Connected)
    );
}

#[tokio::test]
async fn test_second_call_attempt_does_not_disturb_negotiation() {
    let relay = start_relay().await;

    let (alice, _alice_opened, alice_id) =
        start_endpoint(&relay, StubFactory::new("alice", &[])).await;
    let (bob, _bob_opened, bob_id) = start_endpoint(&relay, StubFactory::new("bob", &[])).await;

    alice.call(bob_id.clone()).await.unwrap();

    // Try again while a session with Bob is already live
    match alice.call(bob_id.clone()).await {
        Err(SessionError::Busy(id)) => assert_eq!(id, bob_id),
        Err(other) => panic!("Expected busy, got {:?}", other),
        Ok(()) => panic!("Second call attempt must be rejected"),
    }

    wait_for_connected(&alice, &bob_id).await;
    wait_for_connected(&bob, &alice_id).await;
}
