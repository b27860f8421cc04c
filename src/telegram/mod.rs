//! Telegram user-session transport.
//!
//! The lookup core never talks to Telegram directly; it goes through the
//! [`BotTransport`] trait so the conversation logic can be exercised with
//! scripted transports in tests. The production implementation lives in
//! [`session`] and drives an MTProto user session.

pub mod session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use session::TelegramSession;

/// Errors surfaced by the Telegram transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Session file error: {0}")]
    Session(String),

    #[error("Telegram session is not authorized; sign in once with an MTProto client and reuse the session file")]
    NotAuthorized,

    #[error("Target bot @{0} could not be resolved")]
    TargetNotFound(String),

    #[error("Telegram request failed: {0}")]
    Request(String),

    #[error("Media download failed: {0}")]
    Download(String),
}

/// A message in the private chat with the target bot, reduced to what the
/// lookup core needs.
#[derive(Debug, Clone)]
pub struct BotMessage {
    /// Telegram message id (unique per chat, increasing)
    pub id: i32,
    /// Plain message text (empty for pure media messages)
    pub text: String,
    /// Server-side message timestamp
    pub timestamp: DateTime<Utc>,
    /// `true` when the message was sent by us rather than the bot
    pub outgoing: bool,
    /// `true` when the message carries a photo
    pub has_photo: bool,
}

/// Operations the lookup core needs from the bot conversation.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Sends a text command to the target bot.
    async fn send_command(&self, text: &str) -> Result<(), TransportError>;

    /// Fetches up to `limit` most recent messages, newest first.
    async fn recent_messages(&self, limit: usize) -> Result<Vec<BotMessage>, TransportError>;

    /// Fetches up to `limit` messages older than `message_id`, newest first.
    async fn messages_before(
        &self,
        message_id: i32,
        limit: usize,
    ) -> Result<Vec<BotMessage>, TransportError>;

    /// Downloads the photo attached to a previously fetched message.
    ///
    /// Returns `None` when the message carried no photo or its media handle
    /// is no longer cached.
    async fn download_photo(&self, message_id: i32) -> Result<Option<Vec<u8>>, TransportError>;

    /// Cheap liveness probe for `/health`.
    async fn is_connected(&self) -> bool;
}
