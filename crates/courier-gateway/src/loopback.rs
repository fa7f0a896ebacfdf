//! In-process gateway backend.
//!
//! [`LoopbackGateway`] pairs every session it opens with a
//! [`LoopbackController`]: the controller side injects scripted events and
//! records everything the daemon sends. The integration test suite and the
//! local development harness run against it; production deployments supply
//! their own [`Gateway`] implementation for the real transport.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use courier_types::{ContactCandidate, CorrespondentId};

use crate::session::{
    AuthMode, Gateway, PresenceState, SessionError, SessionEvent, SessionHandle,
};

/// Which discovery call a script applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryCall {
    Query,
    Store,
    Direct,
    Groups,
}

enum DiscoveryScript {
    Unsupported,
    Fail(String),
    Candidates(Vec<ContactCandidate>),
}

struct Shared {
    event_tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    sent: Mutex<Vec<(CorrespondentId, String)>>,
    discovery: Mutex<HashMap<DiscoveryCall, DiscoveryScript>>,
    pairing_code: Mutex<String>,
    connect_attempts: AtomicU32,
    fail_next_connects: AtomicU32,
    hang_next_connects: AtomicU32,
    presence_updates: AtomicU32,
    credential_saves: AtomicU32,
    auto_open: AtomicBool,
    fail_sends: AtomicBool,
    fail_presence: AtomicBool,
}

/// Gateway backend whose sessions are driven by a [`LoopbackController`].
pub struct LoopbackGateway {
    shared: Arc<Shared>,
}

impl LoopbackGateway {
    /// Create a gateway and the controller that scripts it.
    pub fn new() -> (Self, LoopbackController) {
        let shared = Arc::new(Shared {
            event_tx: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            discovery: Mutex::new(HashMap::new()),
            pairing_code: Mutex::new("HXGQ-2Z4K".to_string()),
            connect_attempts: AtomicU32::new(0),
            fail_next_connects: AtomicU32::new(0),
            hang_next_connects: AtomicU32::new(0),
            presence_updates: AtomicU32::new(0),
            credential_saves: AtomicU32::new(0),
            auto_open: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_presence: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            LoopbackController { shared },
        )
    }
}

#[async_trait]
impl Gateway for LoopbackGateway {
    async fn connect(
        &self,
        _auth_dir: &Path,
        _auth: AuthMode,
    ) -> Result<Box<dyn SessionHandle>, SessionError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let hanging = self.shared.hang_next_connects.load(Ordering::SeqCst);
        if hanging > 0 {
            self.shared
                .hang_next_connects
                .store(hanging - 1, Ordering::SeqCst);
            // Out-wait any sane open timeout; the caller is expected to
            // cancel this future.
            tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
            return Err(SessionError::Request("scripted connect hang elapsed".into()));
        }

        let remaining = self.shared.fail_next_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared
                .fail_next_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::Request("scripted connect failure".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if self.shared.auto_open.load(Ordering::SeqCst) {
            let _ = tx.send(SessionEvent::Open);
        }
        *self.shared.event_tx.lock().unwrap() = Some(tx);

        Ok(Box::new(LoopbackSession {
            shared: Arc::clone(&self.shared),
            events: rx,
        }))
    }
}

/// Scripting and observation handle for a [`LoopbackGateway`].
pub struct LoopbackController {
    shared: Arc<Shared>,
}

impl LoopbackController {
    /// Inject an event into the current session. Returns `false` when no
    /// session is connected.
    pub fn emit(&self, event: SessionEvent) -> bool {
        match &*self.shared.event_tx.lock().unwrap() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Inject `Open`.
    pub fn open(&self) -> bool {
        self.emit(SessionEvent::Open)
    }

    /// Inject `Closed` with the given status code.
    pub fn close(&self, status_code: Option<u16>) -> bool {
        self.emit(SessionEvent::Closed { status_code })
    }

    /// Everything the daemon sent through the session, in order.
    pub fn sent(&self) -> Vec<(CorrespondentId, String)> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn presence_updates(&self) -> u32 {
        self.shared.presence_updates.load(Ordering::SeqCst)
    }

    pub fn credential_saves(&self) -> u32 {
        self.shared.credential_saves.load(Ordering::SeqCst)
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.shared.fail_next_connects.store(n, Ordering::SeqCst);
    }

    /// Stall the next `n` connect attempts until cancelled, for driving
    /// open-timeout handling.
    pub fn hang_next_connects(&self, n: u32) {
        self.shared.hang_next_connects.store(n, Ordering::SeqCst);
    }

    /// Emit `Open` automatically as soon as a session connects.
    pub fn set_auto_open(&self, on: bool) {
        self.shared.auto_open.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, on: bool) {
        self.shared.fail_sends.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_presence(&self, on: bool) {
        self.shared.fail_presence.store(on, Ordering::SeqCst);
    }

    pub fn set_pairing_code(&self, code: &str) {
        *self.shared.pairing_code.lock().unwrap() = code.to_string();
    }

    /// Script a discovery call to return candidates.
    pub fn script_discovery(&self, call: DiscoveryCall, candidates: Vec<ContactCandidate>) {
        self.shared
            .discovery
            .lock()
            .unwrap()
            .insert(call, DiscoveryScript::Candidates(candidates));
    }

    /// Script a discovery call to fail with a request error.
    pub fn script_discovery_error(&self, call: DiscoveryCall, message: &str) {
        self.shared
            .discovery
            .lock()
            .unwrap()
            .insert(call, DiscoveryScript::Fail(message.to_string()));
    }

    /// Script a discovery call as unsupported (the default).
    pub fn script_discovery_unsupported(&self, call: DiscoveryCall) {
        self.shared
            .discovery
            .lock()
            .unwrap()
            .insert(call, DiscoveryScript::Unsupported);
    }
}

/// One scripted session.
pub struct LoopbackSession {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl LoopbackSession {
    fn discovery(&self, call: DiscoveryCall) -> Result<Vec<ContactCandidate>, SessionError> {
        let scripts = self.shared.discovery.lock().unwrap();
        match scripts.get(&call) {
            None | Some(DiscoveryScript::Unsupported) => {
                Err(SessionError::Unsupported(match call {
                    DiscoveryCall::Query => "query_contacts",
                    DiscoveryCall::Store => "store_contacts",
                    DiscoveryCall::Direct => "direct_contacts",
                    DiscoveryCall::Groups => "group_participants",
                }))
            }
            Some(DiscoveryScript::Fail(message)) => Err(SessionError::Request(message.clone())),
            Some(DiscoveryScript::Candidates(candidates)) => Ok(candidates.clone()),
        }
    }
}

#[async_trait]
impl SessionHandle for LoopbackSession {
    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    async fn send_text(
        &self,
        recipient: &CorrespondentId,
        text: &str,
    ) -> Result<(), SessionError> {
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::Request("scripted send failure".into()));
        }
        self.shared
            .sent
            .lock()
            .unwrap()
            .push((recipient.clone(), text.to_string()));
        Ok(())
    }

    async fn update_presence(
        &self,
        _recipient: Option<&CorrespondentId>,
        _state: PresenceState,
    ) -> Result<(), SessionError> {
        self.shared.presence_updates.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_presence.load(Ordering::SeqCst) {
            return Err(SessionError::Request("scripted presence failure".into()));
        }
        Ok(())
    }

    async fn request_pairing_code(&self, _phone: &str) -> Result<String, SessionError> {
        Ok(self.shared.pairing_code.lock().unwrap().clone())
    }

    async fn save_credentials(&self) -> Result<(), SessionError> {
        self.shared.credential_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        self.discovery(DiscoveryCall::Query)
    }

    async fn store_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        self.discovery(DiscoveryCall::Store)
    }

    async fn direct_contacts(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        self.discovery(DiscoveryCall::Direct)
    }

    async fn group_participants(&self) -> Result<Vec<ContactCandidate>, SessionError> {
        self.discovery(DiscoveryCall::Groups)
    }
}
