//! The bot event loop.
//!
//! One cooperative loop owns the gateway session and everything derived
//! from it: lifecycle transitions, reconciliation passes, signal-channel
//! publications, and the outbound-request poller. No inbound message,
//! discovery strategy, or send failure may take the loop down; faults
//! degrade to logged no-ops and only a lifecycle directive ends a session.

use tokio::time::{interval, sleep, timeout};
use tracing::{debug, info, warn};

use courier_gateway::{
    AuthMode, CloseReason, Gateway, InboundMessage, PresenceState, SessionEvent, SessionHandle,
};
use courier_types::{
    CandidateOrigin, ContactCandidate, CorrespondentId, CourierConfig, CourierError,
};

use crate::commands::{CommandAction, CommandDispatcher};
use crate::directory::ContactDirectory;
use crate::instance_lock::InstanceLock;
use crate::lifecycle::{CloseDirective, LifecycleManager};
use crate::reconcile::{ContactReconciler, ReconcileOutcome};
use crate::signal::{SignalChannel, StatusToken};

/// Opaque credential file owned by the gateway library. Cleared on
/// bad-session closes to force a fresh login.
pub const CREDS_FILE: &str = "creds.json";

/// How one driven session ended.
enum SessionExit {
    Closed(CloseReason),
    Shutdown,
    Restart,
}

/// One select-loop turn.
enum Turn {
    Event(Option<SessionEvent>),
    Probe,
    Reconcile,
    Outbound,
    LockRefresh,
    Shutdown,
}

/// The bot process core, generic over the gateway backend.
pub struct Service<G: Gateway> {
    config: CourierConfig,
    gateway: G,
    auth_mode: AuthMode,
    signal: SignalChannel,
    directory: ContactDirectory,
    reconciler: ContactReconciler,
    lifecycle: LifecycleManager,
    dispatcher: CommandDispatcher,
}

impl<G: Gateway> Service<G> {
    pub fn new(config: CourierConfig, gateway: G, auth_mode: AuthMode) -> Self {
        let signal = SignalChannel::new(&config.auth_dir, config.outbound_stale());
        let directory = ContactDirectory::new(&config.auth_dir);
        let reconciler = ContactReconciler::new(&config.auth_dir, config.reconcile_cooldown());
        let lifecycle = LifecycleManager::new(config.retry_ceiling, config.retry_cooldown());
        Self {
            config,
            gateway,
            auth_mode,
            signal,
            directory,
            reconciler,
            lifecycle,
            dispatcher: CommandDispatcher::new(),
        }
    }

    /// Run until logged out, restarted, or shut down.
    ///
    /// Fails fast when another live instance holds the lock. Reconnects
    /// with reason-dependent delays on every non-terminal close.
    pub async fn run(mut self) -> Result<(), CourierError> {
        std::fs::create_dir_all(&self.config.auth_dir)?;
        let lock = InstanceLock::acquire(&self.config.auth_dir, self.config.lock_stale())?;
        self.directory.load();

        let mut shutdown = shutdown_signal();

        loop {
            self.lifecycle.begin_connect();
            self.signal.publish_status(StatusToken::Connecting);

            let connected = timeout(
                self.config.open_timeout(),
                self.gateway
                    .connect(&self.config.auth_dir, self.auth_mode.clone()),
            )
            .await;

            let (exit, closed_token) = match connected {
                Ok(Ok(mut session)) => (
                    self.drive(&mut *session, &lock, &mut shutdown).await,
                    StatusToken::Disconnected,
                ),
                Ok(Err(e)) => {
                    warn!(error = %e, "gateway connect failed");
                    (SessionExit::Closed(CloseReason::Unknown), StatusToken::Error)
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.config.open_timeout_secs,
                        "gateway open timed out"
                    );
                    (SessionExit::Closed(CloseReason::Unknown), StatusToken::Error)
                }
            };

            match exit {
                SessionExit::Shutdown => {
                    info!("shutting down");
                    self.signal.publish_status(StatusToken::Disconnected);
                    lock.release();
                    return Ok(());
                }
                SessionExit::Restart => {
                    info!("restart requested, exiting for the supervisor");
                    self.signal.publish_status(StatusToken::Restarting);
                    lock.release();
                    return Ok(());
                }
                SessionExit::Closed(reason) => {
                    if reason.clears_credentials() {
                        self.clear_credentials();
                    }
                    match self.lifecycle.on_close(reason) {
                        CloseDirective::Terminate => {
                            info!("logged out remotely, not reconnecting");
                            self.signal.publish_status(StatusToken::Disconnected);
                            lock.release();
                            return Ok(());
                        }
                        CloseDirective::Retry {
                            delay,
                            attempt,
                            epoch,
                        } => {
                            self.signal.publish_status(closed_token);
                            info!(
                                reason = %reason,
                                attempt,
                                delay_secs = delay.as_secs(),
                                "reconnect scheduled"
                            );
                            tokio::select! {
                                _ = sleep(delay) => {}
                                _ = shutdown.changed() => {
                                    info!("shutting down during reconnect wait");
                                    self.signal.publish_status(StatusToken::Disconnected);
                                    lock.release();
                                    return Ok(());
                                }
                            }
                            if !self.lifecycle.retry_is_current(epoch) {
                                debug!("stale retry timer, ignoring");
                                continue;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drive one session until it closes or the process is asked to stop.
    async fn drive(
        &mut self,
        session: &mut dyn SessionHandle,
        lock: &InstanceLock,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> SessionExit {
        let mut probe = interval(self.config.probe_interval());
        let mut reconcile_tick = interval(self.config.reconcile_interval());
        let mut outbound = interval(self.config.outbound_poll());
        let mut lock_refresh = interval(self.config.lock_refresh());
        // The first tick of a tokio interval fires immediately; consume it
        // so every period starts now.
        probe.tick().await;
        reconcile_tick.tick().await;
        outbound.tick().await;
        lock_refresh.tick().await;

        let mut pairing_requested = false;

        loop {
            let turn = tokio::select! {
                event = session.next_event() => Turn::Event(event),
                _ = probe.tick() => Turn::Probe,
                _ = reconcile_tick.tick() => Turn::Reconcile,
                _ = outbound.tick() => Turn::Outbound,
                _ = lock_refresh.tick() => Turn::LockRefresh,
                _ = shutdown.changed() => Turn::Shutdown,
            };

            match turn {
                Turn::Event(None) => {
                    warn!("session event stream ended");
                    return SessionExit::Closed(CloseReason::ConnectionClosed);
                }
                Turn::Event(Some(event)) => {
                    if let Some(exit) = self
                        .handle_event(session, event, &mut pairing_requested)
                        .await
                    {
                        return exit;
                    }
                }
                Turn::Probe => {
                    if self.lifecycle.is_open() {
                        if let Err(e) = session
                            .update_presence(None, PresenceState::Available)
                            .await
                        {
                            warn!(error = %e, "health probe unacknowledged");
                            return SessionExit::Closed(CloseReason::ProbeFailed);
                        }
                    }
                }
                Turn::Reconcile => {
                    if self.lifecycle.is_open() {
                        self.reconciler
                            .reconcile(&*session, &mut self.directory)
                            .await;
                    }
                }
                Turn::Outbound => {
                    if self.lifecycle.is_open() {
                        self.deliver_outbound(&*session).await;
                    }
                }
                Turn::LockRefresh => lock.refresh(),
                Turn::Shutdown => return SessionExit::Shutdown,
            }
        }
    }

    async fn handle_event(
        &mut self,
        session: &mut dyn SessionHandle,
        event: SessionEvent,
        pairing_requested: &mut bool,
    ) -> Option<SessionExit> {
        match event {
            SessionEvent::Connecting => {
                if let AuthMode::PairingCode { phone } = &self.auth_mode {
                    if !*pairing_requested && !self.lifecycle.is_open() {
                        *pairing_requested = true;
                        match session.request_pairing_code(phone).await {
                            Ok(code) => {
                                info!(code = %code, "pairing code issued; enter it under linked devices");
                                self.signal.publish_pairing_code(&code, phone);
                            }
                            Err(e) => {
                                warn!(error = %e, "pairing code request failed, staying on qr auth");
                            }
                        }
                    }
                }
            }
            SessionEvent::Open => {
                info!("session open");
                self.lifecycle.on_open();
                // Contacts are persisted by this pass before the status
                // snapshot that reflects them.
                self.reconciler
                    .reconcile(&*session, &mut self.directory)
                    .await;
                self.signal.publish_status(StatusToken::Connected);
            }
            SessionEvent::Closed { status_code } => {
                let reason = CloseReason::classify(status_code);
                warn!(?status_code, reason = %reason, "session closed");
                return Some(SessionExit::Closed(reason));
            }
            SessionEvent::QrCode(qr) => {
                if matches!(self.auth_mode, AuthMode::QrCode) {
                    self.signal.publish_qr(&qr);
                }
            }
            SessionEvent::CredentialsChanged => {
                if let Err(e) = session.save_credentials().await {
                    warn!(error = %e, "failed to persist credentials");
                }
            }
            SessionEvent::ContactsChanged | SessionEvent::ChatsChanged => {
                if self.lifecycle.is_open() {
                    self.reconciler
                        .reconcile(&*session, &mut self.directory)
                        .await;
                }
            }
            SessionEvent::Message(message) => {
                return self.handle_message(&*session, message).await;
            }
        }
        None
    }

    /// Process one inbound message: enrich the directory, dispatch the
    /// command registry, reply best-effort.
    async fn handle_message(
        &mut self,
        session: &dyn SessionHandle,
        message: InboundMessage,
    ) -> Option<SessionExit> {
        if message.sender.is_status_broadcast() {
            return None;
        }

        if !message.sender.is_group() {
            if let Some(push_name) = &message.push_name {
                let mut candidate =
                    ContactCandidate::bare(message.sender.clone(), CandidateOrigin::PushName);
                candidate.notify_name = Some(push_name.clone());
                let outcome = self.directory.upsert(&candidate);
                if outcome.is_new || outcome.changed {
                    debug!(sender = %message.sender, push_name = %push_name, "contact enriched from message");
                }
            }
            self.directory.record_message(&message.sender, message.timestamp);
        }

        // Typing indicator around command handling, both best-effort.
        let _ = session
            .update_presence(Some(&message.sender), PresenceState::Composing)
            .await;

        let exit = match self.dispatcher.dispatch(&message.text) {
            CommandAction::Reply(reply) => {
                self.send_reply(session, &message.sender, &reply).await;
                None
            }
            CommandAction::RefreshContacts => {
                self.send_reply(session, &message.sender, "Refreshing contacts...")
                    .await;
                let outcome = self
                    .reconciler
                    .reconcile(session, &mut self.directory)
                    .await;
                let summary = match outcome {
                    ReconcileOutcome::Skipped => {
                        "Contact refresh is on cooldown, try again later.".to_string()
                    }
                    ReconcileOutcome::Merged(report) => match report.source {
                        Some(source) => format!(
                            "Contacts refreshed via {source}: {} added, {} updated.",
                            report.added, report.updated
                        ),
                        None => "Contact refresh finished, but no source returned data."
                            .to_string(),
                    },
                };
                self.send_reply(session, &message.sender, &summary).await;
                None
            }
            CommandAction::Restart => {
                self.send_reply(session, &message.sender, "Restart initiated. Back shortly.")
                    .await;
                Some(SessionExit::Restart)
            }
        };

        let _ = session
            .update_presence(Some(&message.sender), PresenceState::Paused)
            .await;
        self.directory.save();
        exit
    }

    /// Send a reply; on failure, log and attempt one simpler fallback.
    async fn send_reply(
        &mut self,
        session: &dyn SessionHandle,
        to: &CorrespondentId,
        text: &str,
    ) {
        match session.send_text(to, text).await {
            Ok(()) => {
                self.directory.reset_unread(to);
            }
            Err(e) => {
                warn!(recipient = %to, error = %e, "failed to send reply");
                if let Err(e) = session
                    .send_text(to, "I had trouble sending the full response.")
                    .await
                {
                    warn!(recipient = %to, error = %e, "fallback reply failed too");
                }
            }
        }
    }

    /// Consume the outbound-request slot and forward it to the session.
    /// At most once: a failed send is logged, not requeued.
    async fn deliver_outbound(&mut self, session: &dyn SessionHandle) {
        let Some(request) = self.signal.poll_outbound() else {
            return;
        };
        info!(recipient = %request.recipient_id, "delivering queued outbound request");
        if let Err(e) = session
            .send_text(&request.recipient_id, &request.payload_text)
            .await
        {
            warn!(recipient = %request.recipient_id, error = %e, "queued outbound send failed");
        }
    }

    fn clear_credentials(&self) {
        let path = self.config.auth_dir.join(CREDS_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => info!("cleared persisted credentials to force a fresh login"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to clear credentials"),
        }
    }
}

/// Watch channel flipped once on ctrl-c.
fn shutdown_signal() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}
