//! Realtime connection manager.
//!
//! Owns the one hub connection a tab is allowed, and everything about its
//! lifecycle: idempotent connect guarded against re-entrant
//! initialization, mount reference counting so transient remounts never
//! close the socket, automatic reconnection at a fixed cadence, a
//! re-entrancy-guarded force-reconnect, and terminal shutdown on removal.
//!
//! Commands (`ParticipantStartup`, `ParticipantLeaveClass`,
//! `ParticipantSubmitResponse`) are fire-and-forget: send failures are
//! logged and optimistic local state is not rolled back.

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::events::{self, ServerEvent};
use crate::logging::{Logger, now_ms};
use crate::net::protocol::{self, HubMessage};
use crate::state::activity::SubmitResponse;
use crate::state::session::{ConnectionStatus, Effect, SessionState};
use crate::state::SubmitError;
use crate::store::{ContextStore, JoinContext};

/// Fixed transport retry cadence, matching the hub's reconnect policy.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1500);

/// Keepalive ping cadence; the hub drops clients that stay silent past its
/// timeout.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Maintenance tick cadence for transient-flag expiry.
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded window for the leave invoke to flush before teardown.
const LEAVE_FLUSH: Duration = Duration::from_millis(150);

/// Transport configuration for one session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Full hub WebSocket URL.
    pub ws_url: String,
    pub retry_interval: Duration,
    pub keepalive_interval: Duration,
}

impl SessionConfig {
    /// Hub URL for a region, per the upstream's host scheme.
    #[must_use]
    pub fn for_region(region: &str) -> Self {
        Self {
            ws_url: format!("wss://{region}.classpoint.app/classsession"),
            retry_interval: RETRY_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }

    /// Point at an explicit hub URL (tests, staging).
    #[must_use]
    pub fn for_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            retry_interval: RETRY_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

struct ClientInner {
    config: SessionConfig,
    store: Arc<dyn ContextStore>,
    logger: Logger,
    ctx: Mutex<JoinContext>,
    state: Mutex<SessionState>,
    changes: watch::Sender<u64>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    started: AtomicBool,
    closing: AtomicBool,
    mounts: AtomicUsize,
    reconnect_guard: AtomicBool,
    shutdown: Notify,
}

/// Handle to the session connection and its state. Cloneable; all clones
/// share one connection.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        ctx: JoinContext,
        store: Arc<dyn ContextStore>,
        logger: Logger,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                logger,
                ctx: Mutex::new(ctx),
                state: Mutex::new(SessionState::new(now_ms())),
                changes,
                outgoing: Mutex::new(None),
                task: Mutex::new(None),
                started: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                mounts: AtomicUsize::new(0),
                reconnect_guard: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Open the connection if it is not already open or opening. Re-entrant
    /// callers observe the started guard and no-op instead of racing a
    /// duplicate open. Terminal after removal.
    pub fn connect(&self) {
        if self.with_state(|state| state.removed_from_class) {
            self.inner.logger.warn("connect ignored: removed from class");
            return;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.closing.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_loop(inner));
        if let Ok(mut task) = self.inner.task.lock() {
            *task = Some(handle);
        }
    }

    /// Register a mount and ensure the connection is up.
    pub fn acquire(&self) {
        self.inner.mounts.fetch_add(1, Ordering::SeqCst);
        self.connect();
    }

    /// Release a mount; the connection actually closes only when the last
    /// referent is gone. Saturates at zero.
    pub fn release(&self) {
        let previous = self
            .inner
            .mounts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 {
            self.disconnect();
        }
    }

    /// Tear down the connection. Idempotent, synchronous-best-effort:
    /// safe with no active connection, failures swallowed.
    pub fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.shutdown.notify_waiters();
        if let Ok(mut outgoing) = self.inner.outgoing.lock() {
            *outgoing = None;
        }
        if let Ok(mut task) = self.inner.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        self.inner.started.store(false, Ordering::SeqCst);
        self.update_state(|state| state.set_status(ConnectionStatus::Disconnected));
    }

    /// Tear down any existing connection, clear connection-held flags, and
    /// reconnect. Concurrent callers collapse into one reconnect.
    pub fn force_reconnect(&self) {
        if self.inner.reconnect_guard.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.logger.info("force reconnect requested");
        self.disconnect();
        self.update_state(SessionState::clear_duplicate_connection);
        self.connect();
        self.inner.reconnect_guard.store(false, Ordering::SeqCst);
    }

    /// Leave the class: send the leave command, then clean up locally. If
    /// the send fails synchronously, cleanup proceeds immediately rather
    /// than hanging.
    pub async fn leave(&self) {
        let payload = self.leave_payload();
        if self.send_invocation("ParticipantLeaveClass", &[payload]) {
            // Bounded window for the writer to flush the invoke.
            tokio::time::sleep(LEAVE_FLUSH).await;
            self.inner.logger.info("participant left class");
        } else {
            self.inner
                .logger
                .info("participant left class (no active connection)");
        }
        self.inner.store.clear();
        self.update_state(SessionState::clear_duplicate_connection);
        self.disconnect();
    }

    /// Submit the current (or given) multiple-choice selections.
    ///
    /// # Errors
    ///
    /// [`SubmitError::NoActivity`] when nothing is live, otherwise the
    /// activity's own guards.
    pub fn submit_choices(&self, selections: &[String]) -> Result<(), SubmitError> {
        self.submit_with(|activity, ctx, now| activity.submit_choices(selections, ctx, now))
    }

    /// Submit one short answer.
    ///
    /// # Errors
    ///
    /// See [`SubmitError`]; empty text and the submission limit are
    /// rejected caller-side before any send.
    pub fn submit_short(&self, text: &str) -> Result<(), SubmitError> {
        self.submit_with(|activity, ctx, now| activity.submit_short(text, ctx, now))
    }

    /// Submit a drawing image.
    ///
    /// # Errors
    ///
    /// See [`SubmitError`].
    pub fn submit_drawing(&self, image: &[u8]) -> Result<(), SubmitError> {
        self.submit_with(|activity, ctx, now| activity.submit_drawing(image, ctx, now))
    }

    /// Local pre-submit selection edit.
    pub fn select_choice(&self, choice: &str) {
        self.update_state(|state| {
            if let Some(activity) = &mut state.activity {
                activity.select_choice(choice);
            }
        });
    }

    /// Local reveal affordance (mc only); not a server command.
    pub fn toggle_reveal(&self) {
        self.update_state(|state| {
            if let Some(activity) = &mut state.activity {
                activity.toggle_reveal();
            }
        });
    }

    /// Run periodic maintenance immediately (the run loop does this on its
    /// own cadence while connected).
    pub fn tick(&self) {
        self.update_state(|state| state.tick(now_ms()));
    }

    /// Dispatch one raw hub invocation into the reducer, performing any
    /// requested side effects. The run loop calls this for every decoded
    /// record; it is public so recorded sessions can be replayed offline.
    /// Returns `true` when the event ended the session.
    pub fn apply_hub_invocation(&self, target: &str, arguments: &[Value]) -> bool {
        let terminal = self.inner.handle_invocation(target, arguments);
        if terminal {
            self.disconnect();
        }
        terminal
    }

    /// Read the session state.
    pub fn with_state<R>(&self, read: impl FnOnce(&SessionState) -> R) -> R {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        read(&state)
    }

    /// Current join context snapshot.
    #[must_use]
    pub fn context(&self) -> JoinContext {
        self.inner
            .ctx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Change notifications; the value is a bump counter.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    #[must_use]
    pub fn mounts(&self) -> usize {
        self.inner.mounts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    fn submit_with(
        &self,
        build: impl FnOnce(
            &mut crate::state::Activity,
            &JoinContext,
            i64,
        ) -> Result<SubmitResponse, SubmitError>,
    ) -> Result<(), SubmitError> {
        let ctx = self.context();
        let command = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let activity = state.activity.as_mut().ok_or(SubmitError::NoActivity)?;
            build(activity, &ctx, now_ms())?
        };
        self.inner.bump();

        let payload = serde_json::to_value(&command).unwrap_or(Value::Null);
        if !self.send_invocation("ParticipantSubmitResponse", &[payload]) {
            self.inner
                .logger
                .warn("submit send failed; keeping optimistic state");
        }
        Ok(())
    }

    fn send_invocation(&self, target: &str, arguments: &[Value]) -> bool {
        self.inner.send_invocation(target, arguments)
    }

    fn update_state(&self, update: impl FnOnce(&mut SessionState)) {
        self.inner.update_state(update);
    }

    fn leave_payload(&self) -> Value {
        let ctx = self.context();
        // Mirrors the observed leave message shape; the zero-value point
        // and group fields are legacy and not tracked here.
        json!({
            "deviceId": ctx.participant_id,
            "classCode": ctx.class_code,
            "presenterEmail": ctx.presenter_email,
            "cpcsRegion": ctx.cpcs_region,
            "savedParticipantsForJoin": [],
            "participantId": ctx.participant_id,
            "participantUsername": ctx.participant_username,
            "participantName": ctx.participant_name,
            "participantAvatar": "",
            "participantPoints": 0,
            "participantTotalPoints": 0,
            "pointsBeingAdded": 0,
            "isFromSavedClass": false,
            "groupId": null,
            "language": "en",
            "isAddingPoints": false,
        })
    }
}

impl ClientInner {
    fn bump(&self) {
        self.changes.send_modify(|counter| *counter += 1);
    }

    fn update_state(&self, update: impl FnOnce(&mut SessionState)) {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            update(&mut state);
        }
        self.bump();
    }

    fn send_invocation(&self, target: &str, arguments: &[Value]) -> bool {
        let record = protocol::encode_invocation(target, arguments);
        let sent = self
            .outgoing
            .lock()
            .ok()
            .and_then(|outgoing| {
                outgoing
                    .as_ref()
                    .map(|sender| sender.send(record).is_ok())
            })
            .unwrap_or(false);
        if !sent {
            self.logger
                .warn(format!("invoke {target} failed: no active connection"));
        }
        sent
    }

    fn startup_payload(&self) -> Value {
        let ctx = self
            .ctx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        json!({
            "participantUsername": ctx.participant_username,
            "participantName": ctx.participant_name,
            "participantId": ctx.participant_id,
            "participantAvatar": "",
            "cpcsRegion": ctx.cpcs_region,
            "presenterEmail": ctx.presenter_email,
            "classSessionId": ctx.class_session_id.unwrap_or_default(),
        })
    }

    /// Apply one hub invocation to the session state and perform the
    /// requested effects. Returns `true` when the connection must close.
    fn handle_invocation(&self, target: &str, arguments: &[Value]) -> bool {
        let Some(event) = events::normalize(target, arguments) else {
            self.logger.debug(format!("unhandled hub event {target}"));
            return false;
        };
        let raw = arguments.first().cloned().unwrap_or(Value::Null);

        let effects = {
            let mut ctx = self
                .ctx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let effects = state.apply(&event, &raw, &mut ctx, &self.logger, now_ms());
            if effects.contains(&Effect::PersistContext) {
                self.store.write(&ctx);
            }
            effects
        };
        self.bump();

        if matches!(event, ServerEvent::JoinAnnounce(_)) {
            self.logger.info("join announce applied");
        }

        effects.contains(&Effect::Disconnect)
    }
}

/// Connection loop: connect, handshake, announce, pump messages; reconnect
/// at the fixed cadence until closed or removed.
async fn run_loop(inner: Arc<ClientInner>) {
    let mut first_attempt = true;

    loop {
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }

        inner.update_state(|state| {
            state.set_status(if first_attempt {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            });
        });

        match connect_async(&inner.config.ws_url).await {
            Ok((stream, _)) => {
                first_attempt = false;
                if run_connection(&inner, stream).await {
                    break;
                }
                // A refused handshake already surfaced `Failed`; only a drop
                // of an established connection reads as `Disconnected`.
                inner.update_state(|state| {
                    if state.status == ConnectionStatus::Connected {
                        state.set_status(ConnectionStatus::Disconnected);
                    }
                });
            }
            Err(error) => {
                inner
                    .logger
                    .error(format!("hub connect failed: {error}"));
                inner.update_state(|state| state.set_status(ConnectionStatus::Failed));
            }
        }

        if inner.closing.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            () = inner.shutdown.notified() => break,
            () = tokio::time::sleep(inner.config.retry_interval) => {}
        }
    }

    inner.started.store(false, Ordering::SeqCst);
}

/// Drive one established connection until it drops. Returns `true` when
/// the session is over for good (leave, removal, explicit close).
async fn run_connection(
    inner: &Arc<ClientInner>,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> bool {
    let (mut write, mut read) = stream.split();

    if let Err(error) = write
        .send(Message::Text(protocol::encode_handshake().into()))
        .await
    {
        inner.logger.error(format!("handshake send failed: {error}"));
        return false;
    }

    // No hub traffic flows until the server answers the handshake.
    let handshake_frame = tokio::select! {
        () = inner.shutdown.notified() => return true,
        incoming = read.next() => match incoming {
            Some(Ok(message)) => match message.to_text() {
                Ok(text) => text.to_owned(),
                Err(error) => {
                    inner.logger.warn(format!("non-text handshake response: {error}"));
                    return false;
                }
            },
            Some(Err(error)) => {
                inner.logger.warn(format!("hub recv error: {error}"));
                return false;
            }
            None => return false,
        },
    };
    let first_record = handshake_frame
        .split(protocol::RECORD_SEPARATOR)
        .next()
        .unwrap_or_default();
    if let Err(error) = protocol::parse_handshake_response(first_record) {
        inner.logger.error(format!("hub handshake refused: {error}"));
        inner.update_state(|state| state.set_status(ConnectionStatus::Failed));
        return false;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Ok(mut outgoing) = inner.outgoing.lock() {
        *outgoing = Some(tx);
    }

    inner.update_state(|state| state.set_status(ConnectionStatus::Connected));
    inner.logger.debug(format!(
        "connected; handling {} hub targets",
        events::EVENT_TARGETS.len()
    ));

    // Announce ourselves with the full join context before anything else.
    let startup = inner.startup_payload();
    inner.send_invocation("ParticipantStartup", &[startup]);

    // Records the server batched behind the handshake response; the
    // handshake record itself carries no `type` and decodes to nothing.
    let (mut terminal, mut dropped) = dispatch_frame(inner, &handshake_frame);

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut keepalive = tokio::time::interval(inner.config.keepalive_interval);

    while !(terminal || dropped) {
        tokio::select! {
            () = inner.shutdown.notified() => {
                terminal = true;
            }
            _ = ticker.tick() => {
                inner.update_state(|state| state.tick(now_ms()));
            }
            _ = keepalive.tick() => {
                if let Err(error) = write.send(Message::Text(protocol::encode_ping().into())).await {
                    inner.logger.warn(format!("keepalive send failed: {error}"));
                    break;
                }
            }
            outbound = rx.recv() => {
                let Some(record) = outbound else {
                    // Sender dropped: local teardown.
                    terminal = true;
                    continue;
                };
                if let Err(error) = write.send(Message::Text(record.into())).await {
                    inner.logger.warn(format!("hub send failed: {error}"));
                    break;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(message)) => {
                        let Ok(text) = message.to_text() else {
                            continue;
                        };
                        let (frame_terminal, frame_dropped) = dispatch_frame(inner, text);
                        terminal = terminal || frame_terminal;
                        dropped = frame_dropped;
                    }
                    Some(Err(error)) => {
                        inner.logger.warn(format!("hub recv error: {error}"));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Ok(mut outgoing) = inner.outgoing.lock() {
        *outgoing = None;
    }

    terminal || inner.closing.load(Ordering::SeqCst)
}

/// Decode one text frame and apply every record in it. Returns
/// `(terminal, dropped)`: the session is over for good, or the server
/// closed this connection.
fn dispatch_frame(inner: &Arc<ClientInner>, text: &str) -> (bool, bool) {
    let mut terminal = false;
    let mut dropped = false;

    for hub_message in protocol::decode(text) {
        match hub_message {
            HubMessage::Invocation { target, arguments } => {
                if inner.handle_invocation(&target, &arguments) {
                    inner.closing.store(true, Ordering::SeqCst);
                    terminal = true;
                }
            }
            HubMessage::Ping => {}
            HubMessage::Close { error } => {
                if let Some(reason) = error {
                    inner.logger.warn(format!("hub closed: {reason}"));
                }
                dropped = true;
            }
        }
    }

    (terminal, dropped)
}
