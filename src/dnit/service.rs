//! Lookup orchestration against the target bot.
//!
//! The target bot handles one conversation at a time, so lookups are
//! serialized: one in-flight query, a bounded number of waiters, and an
//! immediate rejection beyond that. A whole lookup is bounded by a hard
//! deadline regardless of how many attempts or wait notices it takes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::parser::{self, DniRecord};
use crate::config::{
    LOOKUP_EXTRA_MEDIA_LIMIT, LOOKUP_HISTORY_LIMIT, LOOKUP_MAX_ATTEMPTS,
    LOOKUP_MAX_WAIT_NOTICE_SECS, LOOKUP_POLL_DELAY_SECS, LOOKUP_RELEVANCE_WINDOW_SECS,
    LOOKUP_RETRY_DELAY_SECS, LOOKUP_TIMEOUT_SECS,
};
use crate::telegram::{BotMessage, BotTransport, TransportError};

/// The bot sends at most four photos per report.
const MAX_IMAGES: usize = 4;

/// Positional image labels: face photo first, then fingerprints and signature.
const IMAGE_KINDS: [&str; MAX_IMAGES] = ["CARA", "HUELLAS", "FIRMA", "HUELLAS"];

/// Errors produced by a lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Lookup queue is full, try again later")]
    Busy,

    #[error("Timeout: no response received within {0} seconds")]
    Timeout(u64),

    #[error("No response from the data bot after {0} attempts")]
    NoResponse(u32),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One downloaded report image, base64-encoded for the JSON response.
#[derive(Debug, Clone, Serialize)]
pub struct DniImage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub base64: String,
}

/// Everything extracted from one successful lookup.
#[derive(Debug, Clone, Serialize)]
pub struct DniReport {
    pub data: DniRecord,
    pub images: Vec<DniImage>,
}

/// Decrements the waiter count when dropped, so cancelled callers (HTTP
/// client disconnects mid-wait) cannot leak queue slots.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serializes lookups against the single bot session.
pub struct LookupService {
    transport: Arc<dyn BotTransport>,
    permit: Arc<Semaphore>,
    waiting: AtomicUsize,
    capacity: usize,
}

impl LookupService {
    #[must_use]
    pub fn new(transport: Arc<dyn BotTransport>, queue_capacity: usize) -> Self {
        Self {
            transport,
            permit: Arc::new(Semaphore::new(1)),
            waiting: AtomicUsize::new(0),
            capacity: queue_capacity,
        }
    }

    /// Number of callers currently waiting for the session.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Health probe for the underlying session.
    pub async fn session_up(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Runs a full `/dnit` lookup for an already validated DNI.
    ///
    /// # Errors
    ///
    /// [`LookupError::Busy`] when the waiter queue is full,
    /// [`LookupError::Timeout`] when the deadline expires, otherwise the
    /// attempt-loop outcome.
    pub async fn lookup(&self, dni: &str) -> Result<DniReport, LookupError> {
        let _slot = self.acquire_slot().await?;

        timeout(
            Duration::from_secs(LOOKUP_TIMEOUT_SECS),
            self.attempt_loop(dni),
        )
        .await
        .map_err(|_| {
            warn!("Lookup for DNI {dni} hit the {LOOKUP_TIMEOUT_SECS}s deadline");
            LookupError::Timeout(LOOKUP_TIMEOUT_SECS)
        })?
    }

    async fn acquire_slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit, LookupError> {
        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.capacity {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(LookupError::Busy);
        }
        // Dropped on every exit path, including cancellation while queued.
        let _waiting = WaitingGuard(&self.waiting);

        self.permit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LookupError::Busy)
    }

    async fn attempt_loop(&self, dni: &str) -> Result<DniReport, LookupError> {
        let command = format!("/dnit {dni}");

        for attempt in 1..=LOOKUP_MAX_ATTEMPTS {
            info!("Attempt {attempt}/{LOOKUP_MAX_ATTEMPTS} for DNI {dni}");
            self.transport.send_command(&command).await?;
            sleep(Duration::from_secs(LOOKUP_POLL_DELAY_SECS)).await;

            if let Some(report) = self.scan_replies(dni).await? {
                info!("Report found for DNI {dni} ({} images)", report.images.len());
                return Ok(report);
            }

            if attempt < LOOKUP_MAX_ATTEMPTS {
                warn!("No reply for DNI {dni} on attempt {attempt}, retrying");
                sleep(Duration::from_secs(LOOKUP_RETRY_DELAY_SECS)).await;
            }
        }

        Err(LookupError::NoResponse(LOOKUP_MAX_ATTEMPTS))
    }

    /// Scans recent history for a reply, honoring bot wait notices.
    async fn scan_replies(&self, dni: &str) -> Result<Option<DniReport>, LookupError> {
        loop {
            let cutoff =
                chrono::Utc::now() - chrono::Duration::seconds(LOOKUP_RELEVANCE_WINDOW_SECS);
            let messages = self.transport.recent_messages(LOOKUP_HISTORY_LIMIT).await?;
            let relevant: Vec<BotMessage> = messages
                .into_iter()
                .filter(|m| {
                    !m.outgoing && m.timestamp > cutoff && parser::references_query(&m.text, dni)
                })
                .collect();
            debug!("Scanning {} relevant messages for DNI {dni}", relevant.len());

            let mut waited = false;
            for msg in &relevant {
                if let Some(secs) = parser::wait_notice_secs(&msg.text) {
                    let secs = secs.clamp(1, LOOKUP_MAX_WAIT_NOTICE_SECS);
                    info!("Bot asked to wait {secs}s for DNI {dni}");
                    sleep(Duration::from_secs(secs)).await;
                    waited = true;
                    break; // re-poll after honoring the notice
                }

                if parser::is_report(&msg.text, dni) {
                    return Ok(Some(self.assemble_report(msg).await?));
                }
            }

            if !waited {
                return Ok(None);
            }
        }
    }

    /// Builds the report from the matched message: parse the text, download
    /// its photo and scan a few older messages for follow-up photos.
    async fn assemble_report(&self, msg: &BotMessage) -> Result<DniReport, LookupError> {
        let mut images = Vec::new();

        if msg.has_photo {
            self.collect_image(msg.id, &mut images).await?;
        }

        let older = self
            .transport
            .messages_before(msg.id, LOOKUP_EXTRA_MEDIA_LIMIT)
            .await?;
        for extra in older {
            if images.len() >= MAX_IMAGES {
                break;
            }
            if extra.has_photo {
                self.collect_image(extra.id, &mut images).await?;
            }
        }

        Ok(DniReport {
            data: parser::parse_record(&msg.text),
            images,
        })
    }

    async fn collect_image(
        &self,
        message_id: i32,
        images: &mut Vec<DniImage>,
    ) -> Result<(), LookupError> {
        if let Some(bytes) = self.transport.download_photo(message_id).await? {
            let kind = IMAGE_KINDS[images.len().min(MAX_IMAGES - 1)];
            debug!("Collected {kind} image ({} bytes)", bytes.len());
            images.push(DniImage {
                kind,
                base64: BASE64.encode(bytes),
            });
        }
        Ok(())
    }
}
