// Session event-loop tests against an in-memory backend, on tokio's paused clock.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use backchat_core::{
    AdminCredentials, ChatBackend, ConnectionMode, ConnectionStatus, CoreError, Identity,
    InboundEvent, LinkState, Message, MessageId, NewMessage, PushChannel, Session, SessionConfig,
};

// ── Fake backend ────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    messages: Vec<Message>,
    next_id: u32,
    subscribers: Vec<mpsc::Sender<InboundEvent>>,
    fail_connects: bool,
    fail_snapshots: bool,
    connect_times: Vec<Instant>,
    snapshot_calls: usize,
}

#[derive(Default)]
struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_connects() -> Arc<Self> {
        let backend = Self::new();
        backend.state.lock().unwrap().fail_connects = true;
        backend
    }

    fn make_message(state: &mut FakeState, username: &str, content: &str, is_admin: bool) -> Message {
        state.next_id += 1;
        Message {
            id: MessageId::new(format!("m{}", state.next_id)),
            username: username.into(),
            content: content.into(),
            is_admin,
            timestamp: Utc::now(),
        }
    }

    /// Store a message without announcing it on any push channel.
    fn insert_silently(&self, username: &str, content: &str) -> MessageId {
        let mut state = self.state.lock().unwrap();
        let message = Self::make_message(&mut state, username, content, false);
        let id = message.id.clone();
        state.messages.push(message);
        id
    }

    fn broadcast(&self, event: InboundEvent) {
        let state = self.state.lock().unwrap();
        for tx in &state.subscribers {
            let _ = tx.try_send(event.clone());
        }
    }

    /// Server-side hangup of every open push channel.
    fn drop_push_channels(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }

    fn live_push_channels(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn connect_offsets(&self, start: Instant) -> Vec<Duration> {
        let state = self.state.lock().unwrap();
        state.connect_times.iter().map(|t| *t - start).collect()
    }

    fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    fn set_fail_snapshots(&self, fail: bool) {
        self.state.lock().unwrap().fail_snapshots = fail;
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn fetch_snapshot(&self) -> Result<Vec<Message>, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        if state.fail_snapshots {
            return Err(CoreError::Timeout);
        }
        Ok(state.messages.clone())
    }

    async fn post_message(&self, message: NewMessage) -> Result<Message, CoreError> {
        let created = {
            let mut state = self.state.lock().unwrap();
            let created =
                Self::make_message(&mut state, &message.username, &message.content, message.is_admin);
            state.messages.push(created.clone());
            created
        };
        self.broadcast(InboundEvent::NewMessage(created.clone()));
        Ok(created)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), CoreError> {
        {
            let mut state = self.state.lock().unwrap();
            let before = state.messages.len();
            state.messages.retain(|m| &m.id != id);
            if state.messages.len() == before {
                return Err(CoreError::MessageNotFound { id: id.to_string() });
            }
        }
        self.broadcast(InboundEvent::MessageDeleted {
            message_id: id.clone(),
        });
        Ok(())
    }

    async fn admin_login(&self, credentials: &AdminCredentials) -> Result<(), CoreError> {
        use secrecy::ExposeSecret;
        if credentials.username == "admin" && credentials.password.expose_secret() == "admin123" {
            Ok(())
        } else {
            Err(CoreError::AuthenticationFailed {
                message: "Invalid credentials".into(),
            })
        }
    }

    async fn open_push(
        &self,
        _identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<PushChannel, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.connect_times.push(Instant::now());
        if state.fail_connects {
            return Err(CoreError::ConnectionFailed {
                url: "ws://fake/ws".into(),
                reason: "refused".into(),
            });
        }
        let (tx, rx) = mpsc::channel(32);
        state.subscribers.push(tx);
        Ok(PushChannel::from_receiver(rx, cancel.child_token()))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> SessionConfig {
    SessionConfig::new("http://chat.test".parse().unwrap())
}

async fn join(backend: &Arc<FakeBackend>, name: &str) -> Session {
    join_with(backend, name, config()).await.unwrap()
}

async fn join_with(
    backend: &Arc<FakeBackend>,
    name: &str,
    config: SessionConfig,
) -> Result<Session, CoreError> {
    let backend: Arc<dyn ChatBackend> = Arc::clone(backend) as Arc<dyn ChatBackend>;
    Session::start(config, Identity::parse(name).unwrap(), backend).await
}

async fn wait_for_status(
    session: &Session,
    pred: impl FnMut(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = session.status();
    let status = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("status never reached")
        .unwrap();
    *status
}

async fn wait_for_messages(session: &Session, pred: impl Fn(&[Arc<Message>]) -> bool) {
    let mut stream = session.messages();
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if pred(stream.current().as_slice()) {
                return;
            }
            stream.changed().await.unwrap();
        }
    })
    .await
    .expect("messages never matched");
}

fn admin() -> AdminCredentials {
    AdminCredentials::new("admin", SecretString::from("admin123".to_string()))
}

fn ids(session: &Session) -> Vec<String> {
    session
        .messages_snapshot()
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}

// ── Reconnect schedule ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_three_failed_connects_back_off_then_poll_forever() {
    let backend = FakeBackend::failing_connects();
    let start = Instant::now();
    let session = join(&backend, "alice").await;

    let status = wait_for_status(&session, |s| s.state == LinkState::Polling).await;
    assert_eq!(status.mode(), ConnectionMode::Poll);
    assert_eq!(status.label(), "connected (polling)");

    assert_eq!(
        backend.connect_offsets(start),
        vec![
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(7),
        ]
    );

    // Polling began at t=7s; ticks follow at 9, 11, 13, 15.
    tokio::time::sleep_until(start + Duration::from_secs(16)).await;
    assert_eq!(backend.snapshot_calls(), 1 + 4);

    // Push is never retried again.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(backend.connect_offsets(start).len(), 4);
    assert_eq!(session.connection_status().state, LinkState::Polling);
    assert_eq!(backend.live_push_channels(), 0);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_backoff_status_counts_up() {
    let backend = FakeBackend::failing_connects();
    let session = join(&backend, "alice").await;

    let mut rx = session.status();
    let mut labels = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let status = *rx.borrow_and_update();
            if labels.last() != Some(&status.label()) {
                labels.push(status.label());
            }
            if status.state == LinkState::Polling {
                break;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    assert!(labels.contains(&"reconnecting 1/3".to_string()), "{labels:?}");
    assert!(labels.contains(&"reconnecting 3/3".to_string()), "{labels:?}");
    assert_eq!(labels.last().unwrap(), "connected (polling)");
}

#[tokio::test(start_paused = true)]
async fn test_reopen_resets_retry_count() {
    let backend = FakeBackend::new();
    let start = Instant::now();
    let session = join(&backend, "alice").await;
    wait_for_status(&session, |s| s.state == LinkState::PushOpen).await;

    backend.drop_push_channels();
    wait_for_status(&session, |s| matches!(s.state, LinkState::Backoff { attempt: 0 })).await;

    let status = wait_for_status(&session, |s| s.state == LinkState::PushOpen).await;
    assert_eq!(status.retry_count, 0);
    assert_eq!(session.client_state().connection_mode, ConnectionMode::Push);
    assert_eq!(
        backend.connect_offsets(start),
        vec![Duration::ZERO, Duration::from_secs(1)]
    );
    assert_eq!(backend.live_push_channels(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polling_picks_up_new_messages() {
    let backend = FakeBackend::failing_connects();
    let session = join(&backend, "alice").await;
    wait_for_status(&session, |s| s.state == LinkState::Polling).await;

    let id = backend.insert_silently("bob", "anyone there?");
    wait_for_messages(&session, |msgs| msgs.iter().any(|m| m.id == id)).await;
    assert_eq!(ids(&session), vec![id.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_polls_skips_backoff() {
    let backend = FakeBackend::failing_connects();
    let mut config = config();
    config.reconnect.first_failure_polls = true;
    let start = Instant::now();
    let session = join_with(&backend, "alice", config).await.unwrap();

    let status = wait_for_status(&session, |s| s.state == LinkState::Polling).await;
    assert_eq!(status.retry_count, 0);
    assert_eq!(backend.connect_offsets(start), vec![Duration::ZERO]);

    // Polling began at t=0; ticks follow at 2, 4, 6, 8.
    tokio::time::sleep_until(start + Duration::from_secs(9)).await;
    assert_eq!(backend.snapshot_calls(), 1 + 4);
    assert_eq!(backend.connect_offsets(start).len(), 1);
    assert!(session.is_running());

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_is_rejected() {
    let backend = FakeBackend::failing_connects();
    let mut config = config();
    config.poll_interval = Duration::ZERO;
    config.reconnect.max_retries = 0;

    let result = join_with(&backend, "alice", config).await;
    assert!(matches!(result, Err(CoreError::ValidationFailed { .. })));
    assert!(backend.connect_offsets(Instant::now()).is_empty());
}

// ── End-to-end scenarios ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_send_shows_once_despite_push_and_snapshot() {
    let backend = FakeBackend::new();
    let session = join(&backend, "alice").await;
    wait_for_status(&session, |s| s.state == LinkState::PushOpen).await;

    let created = session.send("hi").await.unwrap();
    wait_for_messages(&session, |msgs| !msgs.is_empty()).await;

    // A snapshot listing the same message must not add a second entry.
    session.refresh().await.unwrap();
    backend.broadcast(InboundEvent::NewMessage(created.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = session.messages_snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, created.id);
    assert_eq!(messages[0].username, "alice");
    assert_eq!(messages[0].content, "hi");
    assert!(!messages[0].is_admin);
}

#[tokio::test(start_paused = true)]
async fn test_admin_delete_reaches_other_clients() {
    let backend = FakeBackend::new();
    let m1 = backend.insert_silently("carol", "spam");
    let alice = join(&backend, "alice").await;
    let bob = join(&backend, "bob").await;
    wait_for_status(&alice, |s| s.state == LinkState::PushOpen).await;
    wait_for_status(&bob, |s| s.state == LinkState::PushOpen).await;
    assert_eq!(ids(&alice), vec![m1.to_string()]);

    assert!(matches!(bob.delete(&m1).await, Err(CoreError::AdminRequired)));

    bob.admin_login(&admin()).await.unwrap();
    assert!(bob.is_admin());
    bob.delete(&m1).await.unwrap();

    wait_for_messages(&alice, |msgs| msgs.is_empty()).await;
    wait_for_messages(&bob, |msgs| msgs.is_empty()).await;

    // Already gone on the server: the caller hears about it, views stay put.
    assert!(matches!(
        bob.delete(&m1).await,
        Err(CoreError::MessageNotFound { .. })
    ));
    assert!(alice.messages_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deletion_of_unknown_id_is_silent() {
    let backend = FakeBackend::new();
    backend.insert_silently("carol", "hello");
    let session = join(&backend, "alice").await;
    wait_for_status(&session, |s| s.state == LinkState::PushOpen).await;

    backend.broadcast(InboundEvent::MessageDeleted {
        message_id: MessageId::from("ghost"),
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.messages_snapshot().len(), 1);
    assert_eq!(session.connection_status().state, LinkState::PushOpen);
}

// ── User actions ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_admin_messages_are_tagged() {
    let backend = FakeBackend::new();
    let session = join(&backend, "root").await;
    session.admin_login(&admin()).await.unwrap();

    let created = session.send("be nice").await.unwrap();
    assert!(created.is_admin);
}

#[tokio::test(start_paused = true)]
async fn test_bad_admin_password_is_rejected() {
    let backend = FakeBackend::new();
    let session = join(&backend, "mallory").await;
    let wrong = AdminCredentials::new("admin", SecretString::from("guess".to_string()));

    assert!(matches!(
        session.admin_login(&wrong).await,
        Err(CoreError::AuthenticationFailed { .. })
    ));
    assert!(!session.is_admin());
}

#[tokio::test(start_paused = true)]
async fn test_blank_message_is_rejected_locally() {
    let backend = FakeBackend::new();
    let session = join(&backend, "alice").await;

    assert!(matches!(
        session.send("   ").await,
        Err(CoreError::ValidationFailed { .. })
    ));
    assert!(backend.state.lock().unwrap().messages.is_empty());
}

// ── Snapshot failures and shutdown ──────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failed_snapshot_is_reported_until_recovered() {
    let backend = FakeBackend::new();
    backend.set_fail_snapshots(true);
    let session = join(&backend, "alice").await;
    assert!(session.connection_status().snapshot_failed);
    assert!(session.messages_snapshot().is_empty());

    assert!(matches!(session.refresh().await, Err(CoreError::Timeout)));

    backend.set_fail_snapshots(false);
    backend.insert_silently("bob", "back online");
    assert!(session.refresh().await.unwrap());

    let status = wait_for_status(&session, |s| !s.snapshot_failed).await;
    assert!(!status.snapshot_failed);
    assert_eq!(session.messages_snapshot().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_transport() {
    let backend = FakeBackend::new();
    let session = join(&backend, "alice").await;
    wait_for_status(&session, |s| s.state == LinkState::PushOpen).await;
    let mut stream = session.messages();

    session.shutdown().await;
    session.shutdown().await;

    assert!(!session.is_running());
    assert_eq!(backend.live_push_channels(), 0);
    assert!(matches!(session.send("hi").await, Err(CoreError::SessionClosed)));
    assert!(matches!(session.refresh().await, Err(CoreError::SessionClosed)));
    assert!(stream.changed().await.is_none());
}
