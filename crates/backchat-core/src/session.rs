// ── Chat session ──
//
// Full lifecycle of one joined identity: initial snapshot, the event loop
// that owns the reconciler, policy and transport selector, and the handle
// consumers use for user actions and observation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ChatBackend, HttpBackend};
use crate::config::{AdminCredentials, SessionConfig};
use crate::error::CoreError;
use crate::model::{ClientState, Identity, Message, MessageId, NewMessage, validate_content};
use crate::policy::{ConnectionStatus, Directive, ReconnectPolicy};
use crate::store::{Applied, Reconciler};
use crate::stream::MessageStream;
use crate::transport::{TransportEvent, TransportSelector};

const COMMAND_CHANNEL_SIZE: usize = 16;

type Snapshot = Arc<Vec<Arc<Message>>>;

enum SessionCommand {
    Refresh {
        reply: oneshot::Sender<Result<bool, CoreError>>,
    },
}

// ── Session ─────────────────────────────────────────────────────────

/// Handle to a running chat session.
///
/// Cheaply cloneable. The event loop stops on [`shutdown`](Self::shutdown)
/// or when the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    identity: Identity,
    backend: Arc<dyn ChatBackend>,
    messages: watch::Receiver<Snapshot>,
    status: watch::Receiver<ConnectionStatus>,
    command_tx: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    is_admin: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Session {
    /// Join as `identity` against the chat server in `config`.
    pub async fn connect(config: SessionConfig, identity: Identity) -> Result<Self, CoreError> {
        let backend = HttpBackend::new(&config)?;
        Self::start(config, identity, Arc::new(backend)).await
    }

    /// Load the initial snapshot, then start the event loop.
    ///
    /// Fails only when `config` is unusable. A failed initial load is not
    /// fatal: the list starts empty and the status reports the failure
    /// until a later load succeeds.
    pub async fn start(
        config: SessionConfig,
        identity: Identity,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let mut reconciler = Reconciler::new();
        let snapshot_failed = match backend.fetch_snapshot().await {
            Ok(messages) => {
                reconciler.apply_snapshot(messages);
                debug!(count = reconciler.len(), "initial snapshot loaded");
                false
            }
            Err(e) => {
                warn!(error = %e, "initial snapshot failed");
                true
            }
        };

        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let (status_tx, status_rx) = watch::channel(policy.status(snapshot_failed));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let messages = reconciler.watch();
        let session_loop = SessionLoop {
            backend: Arc::clone(&backend),
            identity: identity.clone(),
            selector: TransportSelector::new(config.poll_interval),
            reconciler,
            policy,
            status: status_tx,
            snapshot_failed,
            commands: command_rx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(session_loop.run());

        info!(identity = %identity, url = %config.url, "session started");

        Ok(Self {
            inner: Arc::new(SessionInner {
                identity,
                backend,
                messages,
                status: status_rx,
                command_tx,
                cancel,
                is_admin: AtomicBool::new(false),
                task: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to the visible message list.
    pub fn messages(&self) -> MessageStream {
        MessageStream::new(self.inner.messages.clone())
    }

    pub fn messages_snapshot(&self) -> Snapshot {
        self.inner.messages.borrow().clone()
    }

    /// Subscribe to link status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn client_state(&self) -> ClientState {
        let status = self.connection_status();
        ClientState {
            messages: self.messages_snapshot(),
            connection_mode: status.mode(),
            retry_count: status.retry_count,
        }
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Post a message under this session's identity.
    ///
    /// Nothing is inserted locally; the message shows up when it comes
    /// back through push or poll.
    pub async fn send(&self, content: &str) -> Result<Message, CoreError> {
        validate_content(content)?;
        self.ensure_running()?;

        let message = NewMessage {
            username: self.inner.identity.as_str().to_owned(),
            content: content.to_owned(),
            is_admin: self.is_admin(),
        };
        let created = self.inner.backend.post_message(message).await?;
        debug!(id = %created.id, "message posted");
        Ok(created)
    }

    /// Delete a message. Requires a prior [`admin_login`](Self::admin_login).
    pub async fn delete(&self, id: &MessageId) -> Result<(), CoreError> {
        if !self.is_admin() {
            return Err(CoreError::AdminRequired);
        }
        self.ensure_running()?;

        self.inner.backend.delete_message(id).await?;
        info!(id = %id, "message deleted");
        Ok(())
    }

    pub async fn admin_login(&self, credentials: &AdminCredentials) -> Result<(), CoreError> {
        self.ensure_running()?;
        self.inner.backend.admin_login(credentials).await?;
        self.inner.is_admin.store(true, Ordering::Release);
        info!(identity = %self.inner.identity, "logged in as admin");
        Ok(())
    }

    pub fn is_admin(&self) -> bool {
        self.inner.is_admin.load(Ordering::Acquire)
    }

    /// Load a snapshot now, outside the poll cadence.
    ///
    /// Returns whether the visible list changed.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(SessionCommand::Refresh { reply })
            .await
            .map_err(|_| CoreError::SessionClosed)?;
        rx.await.map_err(|_| CoreError::SessionClosed)?
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop the event loop and release the active transport.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("session shut down");
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CoreError::SessionClosed)
        }
    }
}

// ── Event loop ──────────────────────────────────────────────────────

/// Sole owner of the session's mutable state.
struct SessionLoop {
    backend: Arc<dyn ChatBackend>,
    identity: Identity,
    reconciler: Reconciler,
    policy: ReconnectPolicy,
    selector: TransportSelector,
    status: watch::Sender<ConnectionStatus>,
    snapshot_failed: bool,
    commands: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionLoop {
    async fn run(mut self) {
        if let Some(directive) = self.policy.start() {
            self.execute(directive);
        }
        self.publish_status();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                event = self.selector.next() => self.handle_transport(event).await,
            }
            self.publish_status();
        }

        self.selector.teardown();
        debug!("session loop exiting");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Refresh { reply } => {
                let result = self.load_snapshot().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.policy.on_open();
                info!(identity = %self.identity, "push channel open");
            }
            TransportEvent::ConnectFailed(e) => {
                warn!(error = %e, attempt = self.policy.retry_count(), "push connect failed");
                self.on_push_lost();
            }
            TransportEvent::Closed => {
                info!("push channel closed");
                self.on_push_lost();
            }
            TransportEvent::Inbound(event) => {
                let id = event.message_id().clone();
                match self.reconciler.apply_event(event) {
                    Applied::Inserted => debug!(id = %id, "message arrived"),
                    Applied::Removed => debug!(id = %id, "message removed"),
                    Applied::Duplicate | Applied::Absent | Applied::Suppressed => {
                        debug!(id = %id, "event already reflected");
                    }
                }
            }
            TransportEvent::RetryDue => {
                if let Some(directive) = self.policy.on_retry_due() {
                    self.execute(directive);
                }
            }
            TransportEvent::PollTick => {
                if let Err(e) = self.load_snapshot().await {
                    warn!(error = %e, "poll failed");
                }
            }
        }
    }

    fn on_push_lost(&mut self) {
        if let Some(directive) = self.policy.on_closed() {
            self.execute(directive);
        }
    }

    fn execute(&mut self, directive: Directive) {
        match directive {
            Directive::Connect => {
                let backend = Arc::clone(&self.backend);
                let identity = self.identity.clone();
                let cancel = self.cancel.clone();
                self.selector.open_push(Box::pin(async move {
                    backend.open_push(&identity, &cancel).await
                }));
            }
            Directive::Retry { attempt, delay } => {
                info!(
                    attempt = attempt + 1,
                    max = self.policy.config().max_retries,
                    delay_ms = millis(delay),
                    "push channel lost, retrying"
                );
                self.selector.schedule_retry(delay);
            }
            Directive::StartPolling => {
                warn!(
                    interval_ms = millis(self.selector.poll_interval()),
                    "giving up on push, polling for the rest of the session"
                );
                self.selector.start_polling();
            }
        }
    }

    /// Fetch and apply a snapshot. Abandoned if the session is cancelled.
    async fn load_snapshot(&mut self) -> Result<bool, CoreError> {
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(CoreError::SessionClosed),
            result = self.backend.fetch_snapshot() => result,
        };

        match fetched {
            Ok(messages) => {
                self.snapshot_failed = false;
                let changed = self.reconciler.apply_snapshot(messages);
                if changed {
                    debug!(count = self.reconciler.len(), "snapshot applied");
                }
                Ok(changed)
            }
            Err(e) => {
                self.snapshot_failed = true;
                Err(e)
            }
        }
    }

    fn publish_status(&self) {
        let next = self.policy.status(self.snapshot_failed);
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(status = %next, "connection status changed");
            *current = next;
            true
        });
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
