// backchat-core: Live-update core between backchat-api and consumers (CLI).

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod session;
pub mod store;
pub mod stream;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{ChatBackend, HttpBackend};
pub use config::{AdminCredentials, ReconnectConfig, SessionConfig, TlsVerification};
pub use error::CoreError;
pub use policy::{ConnectionStatus, Directive, LinkState, ReconnectPolicy};
pub use session::Session;
pub use store::{Applied, Reconciler};
pub use stream::MessageStream;
pub use transport::{TransportEvent, TransportKind, TransportSelector};

pub use model::{
    ClientState, ConnectionMode, Identity, InboundEvent, Message, MessageId, NewMessage,
    validate_content,
};

// Lets backends outside this crate build push channels without depending
// on backchat-api directly.
pub use backchat_api::PushChannel;
