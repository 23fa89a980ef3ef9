// ── Chat backend seam ──
//
// Everything the session needs from the outside world: snapshot loads,
// user actions, and opening the push channel. `HttpBackend` is the real
// implementation over `backchat_api`; tests supply in-memory doubles.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use backchat_api::transport::{TlsMode, TransportConfig};
use backchat_api::{ChatClient, PushChannel};

use crate::config::{AdminCredentials, SessionConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{Identity, Message, MessageId, NewMessage};

#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Full ordered message list, oldest first.
    async fn fetch_snapshot(&self) -> Result<Vec<Message>, CoreError>;

    /// Append a message. The created record is returned but the session
    /// waits for it to arrive through push or poll before showing it.
    async fn post_message(&self, message: NewMessage) -> Result<Message, CoreError>;

    async fn delete_message(&self, id: &MessageId) -> Result<(), CoreError>;

    async fn admin_login(&self, credentials: &AdminCredentials) -> Result<(), CoreError>;

    /// Open the push channel for `identity`. The channel's reader must stop
    /// when `cancel` fires.
    async fn open_push(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<PushChannel, CoreError>;
}

// ── HttpBackend ─────────────────────────────────────────────────────

/// [`ChatBackend`] over the chat server's REST API and websocket.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: ChatClient,
    snapshot_limit: Option<u32>,
}

impl HttpBackend {
    pub fn new(config: &SessionConfig) -> Result<Self, CoreError> {
        let transport = build_transport(config);
        let client = ChatClient::new(config.url.clone(), &transport)?;
        Ok(Self {
            client,
            snapshot_limit: config.snapshot_limit,
        })
    }

    /// Wrap an existing client.
    pub fn with_client(client: ChatClient, snapshot_limit: Option<u32>) -> Self {
        Self {
            client,
            snapshot_limit,
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_snapshot(&self) -> Result<Vec<Message>, CoreError> {
        Ok(self.client.list_messages(self.snapshot_limit).await?)
    }

    async fn post_message(&self, message: NewMessage) -> Result<Message, CoreError> {
        Ok(self.client.create_message(&message).await?)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), CoreError> {
        let resp = self.client.delete_message(id).await?;
        if !resp.success {
            return Err(CoreError::Rejected {
                message: format!("server declined to delete {id}"),
            });
        }
        Ok(())
    }

    async fn admin_login(&self, credentials: &AdminCredentials) -> Result<(), CoreError> {
        let resp = self
            .client
            .admin_login(&credentials.username, &credentials.password)
            .await?;
        if !resp.success {
            return Err(CoreError::AuthenticationFailed {
                message: "Invalid credentials".into(),
            });
        }
        debug!(username = %credentials.username, "admin login accepted");
        Ok(())
    }

    async fn open_push(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<PushChannel, CoreError> {
        let url = self.client.push_url(identity.as_str())?;
        Ok(PushChannel::open(&url, cancel).await?)
    }
}

fn build_transport(config: &SessionConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
