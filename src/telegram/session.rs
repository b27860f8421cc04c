//! Production [`BotTransport`] over an MTProto user session.
//!
//! The gateway signs in as a regular Telegram *user* (the target is itself a
//! bot, and bots cannot message other bots), so authentication uses
//! `API_ID`/`API_HASH` plus a session file that must already be authorized.
//! Photo media handles are cached per fetch so the lookup core can download
//! images by message id after it has decided which reply matters.

use std::collections::HashMap;

use async_trait::async_trait;
use grammers_client::types::{Chat, Downloadable, Media, Message};
use grammers_client::{Client, Config, InitParams};
use grammers_session::Session;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{BotMessage, BotTransport, TransportError};
use crate::config::Settings;
use crate::utils::retry_transport_operation;

/// Media handles kept around for download; pruned when it grows past this.
const MEDIA_CACHE_LIMIT: usize = 64;

/// Long-lived Telegram user session bound to one target bot.
pub struct TelegramSession {
    client: Client,
    chat: Chat,
    target_bot: String,
    media: Mutex<HashMap<i32, Media>>,
}

impl TelegramSession {
    /// Connects, verifies authorization and resolves the target bot.
    ///
    /// # Errors
    ///
    /// Fails when the session file cannot be read or written, the session is
    /// not authorized, or the target bot username does not resolve.
    pub async fn connect(settings: &Settings) -> Result<Self, TransportError> {
        let session = Session::load_file_or_create(&settings.session_file)
            .map_err(|e| TransportError::Session(e.to_string()))?;

        let client = Client::connect(Config {
            session,
            api_id: settings.api_id,
            api_hash: settings.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;

        if !client
            .is_authorized()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
        {
            return Err(TransportError::NotAuthorized);
        }

        // Persist fresh auth key material right away so reconnects reuse it.
        client
            .session()
            .save_to_file(&settings.session_file)
            .map_err(|e| TransportError::Session(e.to_string()))?;

        let chat = client
            .resolve_username(&settings.target_bot)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .ok_or_else(|| TransportError::TargetNotFound(settings.target_bot.clone()))?;

        info!("Telegram session ready, target bot @{}", settings.target_bot);

        Ok(Self {
            client,
            chat,
            target_bot: settings.target_bot.clone(),
            media: Mutex::new(HashMap::new()),
        })
    }

    /// Converts a raw message, stashing its photo handle for later download.
    async fn register(&self, msg: &Message) -> BotMessage {
        let mut has_photo = false;
        if let Some(media) = msg.media() {
            if matches!(media, Media::Photo(_)) {
                has_photo = true;
                let mut cache = self.media.lock().await;
                if cache.len() >= MEDIA_CACHE_LIMIT {
                    cache.clear();
                }
                cache.insert(msg.id(), media);
            }
        }

        BotMessage {
            id: msg.id(),
            text: msg.text().to_string(),
            timestamp: msg.date(),
            outgoing: msg.outgoing(),
            has_photo,
        }
    }

    async fn fetch_history(
        &self,
        limit: usize,
        before_id: Option<i32>,
    ) -> Result<Vec<BotMessage>, TransportError> {
        let raw = retry_transport_operation(|| async {
            let mut iter = self.client.iter_messages(&self.chat).limit(limit);
            if let Some(offset) = before_id {
                iter = iter.offset_id(offset);
            }

            let mut out = Vec::with_capacity(limit);
            while let Some(msg) = iter
                .next()
                .await
                .map_err(|e| anyhow::anyhow!("history fetch from @{}: {e}", self.target_bot))?
            {
                out.push(msg);
            }
            Ok(out)
        })
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut messages = Vec::with_capacity(raw.len());
        for msg in &raw {
            messages.push(self.register(msg).await);
        }
        debug!("Fetched {} messages (before_id={:?})", messages.len(), before_id);
        Ok(messages)
    }
}

#[async_trait]
impl BotTransport for TelegramSession {
    async fn send_command(&self, text: &str) -> Result<(), TransportError> {
        retry_transport_operation(|| async {
            self.client
                .send_message(&self.chat, text)
                .await
                .map_err(|e| anyhow::anyhow!("send to @{}: {e}", self.target_bot))
        })
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(())
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<BotMessage>, TransportError> {
        self.fetch_history(limit, None).await
    }

    async fn messages_before(
        &self,
        message_id: i32,
        limit: usize,
    ) -> Result<Vec<BotMessage>, TransportError> {
        self.fetch_history(limit, Some(message_id)).await
    }

    async fn download_photo(&self, message_id: i32) -> Result<Option<Vec<u8>>, TransportError> {
        let media = { self.media.lock().await.get(&message_id).cloned() };
        let Some(media) = media else {
            return Ok(None);
        };

        let downloadable = Downloadable::Media(media);
        let mut bytes = Vec::new();
        let mut download = self.client.iter_download(&downloadable);
        while let Some(chunk) = download
            .next()
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?
        {
            bytes.extend(chunk);
        }

        debug!("Downloaded photo for message {message_id}: {} bytes", bytes.len());
        Ok(Some(bytes))
    }

    async fn is_connected(&self) -> bool {
        self.client.is_authorized().await.unwrap_or(false)
    }
}
