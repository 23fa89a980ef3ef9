// backchat-api: Async Rust client for the chat server (REST + push channel)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::ChatClient;
pub use error::Error;
pub use models::{InboundEvent, Message, MessageId, NewMessage};
pub use websocket::PushChannel;
