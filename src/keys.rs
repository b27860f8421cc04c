//! API key registry and invalid-key flood protection.
//!
//! Keys are held in memory and mirrored to a JSON file so restarts keep
//! registrations. Expiry is enforced lazily on validation. Repeated invalid
//! keys are logged with throttling through a TTL cache to keep the log
//! readable when a key leaks or a script misbehaves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One registered API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub description: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a validation check, mirroring the HTTP error surface.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyValidation {
    Valid,
    Missing,
    Unknown,
    Expired,
}

impl KeyValidation {
    /// User-facing description for rejected keys.
    #[must_use]
    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "",
            Self::Missing => "API Key requerida. Use ?key=... o el header X-API-Key",
            Self::Unknown => "API Key inválida",
            Self::Expired => "API Key expirada",
        }
    }
}

/// File-backed key registry.
pub struct ApiKeyStore {
    path: PathBuf,
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl ApiKeyStore {
    /// Loads the registry from `path`, starting empty when the file is
    /// missing or unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keys = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, ApiKey>>(&raw) {
                Ok(map) => {
                    info!("Loaded {} API keys from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Ignoring corrupt key file {}: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            keys: RwLock::new(keys),
        }
    }

    /// Validates a key, pruning it when expired.
    pub async fn validate(&self, key: Option<&str>) -> KeyValidation {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return KeyValidation::Missing;
        };

        let expired = {
            let keys = self.keys.read().await;
            match keys.get(key) {
                None => return KeyValidation::Unknown,
                Some(entry) => entry.expires_at <= Utc::now(),
            }
        };

        if expired {
            self.keys.write().await.remove(key);
            self.persist().await;
            return KeyValidation::Expired;
        }
        KeyValidation::Valid
    }

    /// Registers (or replaces) a key.
    pub async fn register(&self, key: String, description: String, expires_at: DateTime<Utc>) {
        self.keys.write().await.insert(
            key,
            ApiKey {
                description,
                expires_at,
            },
        );
        self.persist().await;
    }

    /// Deletes a key; returns `false` when it was not registered.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.keys.write().await.remove(key).is_some();
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Number of registered keys (expired entries included until pruned).
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// `true` when no key is registered.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Best-effort rewrite of the backing file.
    async fn persist(&self) {
        let snapshot = { self.keys.read().await.clone() };
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&self.path, bytes).await {
                    warn!("Failed to persist API keys to {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("Failed to serialize API keys: {e}"),
        }
    }
}

/// Cache tracking recently rejected keys so repeated failures are logged
/// with throttling instead of once per request.
pub struct InvalidKeyCache {
    cache: Cache<String, ()>,
    silenced_count: Arc<AtomicU64>,
}

impl InvalidKeyCache {
    /// Creates a cache whose entries expire after `cooldown_secs`.
    #[must_use]
    pub fn new(cooldown_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(cooldown_secs))
            .build();

        Self {
            cache,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `true` when this rejection should be logged loudly.
    ///
    /// The first failure per key (per cooldown window) is loud; repeats are
    /// counted and surfaced every 100th occurrence at debug level.
    pub async fn should_log(&self, key: &str) -> bool {
        if self.cache.get(key).await.is_none() {
            self.cache.insert(key.to_string(), ()).await;
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!("Silenced {count} invalid-key attempts");
        }
        false
    }

    /// Total number of throttled rejections, for `/health` style reporting.
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }
}
