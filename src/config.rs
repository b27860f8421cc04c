//! Configuration and settings management
//!
//! Loads settings from environment variables and defines lookup constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram API id obtained from my.telegram.org
    pub api_id: i32,

    /// Telegram API hash paired with `api_id`
    pub api_hash: String,

    /// Username of the data bot the gateway talks to (with or without `@`)
    #[serde(default = "default_target_bot")]
    pub target_bot: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the pre-authorized Telegram session file
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Path of the JSON file backing the API key registry
    #[serde(default = "default_api_keys_file")]
    pub api_keys_file: String,
}

fn default_target_bot() -> String {
    "OlimpoDataBot".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_session_file() -> String {
    "dnit.session".to_string()
}

fn default_api_keys_file() -> String {
    "api_keys.json".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `API_ID`/`API_HASH`
    /// are missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // Note: Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't pick them up
        if settings.target_bot.is_empty() {
            if let Ok(val) = std::env::var("TARGET_BOT") {
                if !val.is_empty() {
                    settings.target_bot = val;
                }
            }
        }
        if settings.session_file.is_empty() {
            if let Ok(val) = std::env::var("SESSION_FILE") {
                if !val.is_empty() {
                    settings.session_file = val;
                }
            }
        }

        // The bot username is compared and resolved without the leading `@`.
        if let Some(stripped) = settings.target_bot.strip_prefix('@') {
            settings.target_bot = stripped.to_string();
        }

        Ok(settings)
    }
}

// Lookup configuration
/// Hard deadline for a whole `/dnit` lookup in seconds
pub const LOOKUP_TIMEOUT_SECS: u64 = 35;
/// Number of send-and-poll attempts before giving up
pub const LOOKUP_MAX_ATTEMPTS: u32 = 3;
/// Pause between sending the command and reading history, in seconds
pub const LOOKUP_POLL_DELAY_SECS: u64 = 2;
/// Pause between failed attempts, in seconds
pub const LOOKUP_RETRY_DELAY_SECS: u64 = 3;
/// How many recent messages to scan per poll
pub const LOOKUP_HISTORY_LIMIT: usize = 15;
/// Only messages younger than this are considered replies, in seconds
pub const LOOKUP_RELEVANCE_WINDOW_SECS: i64 = 60;
/// How many older messages to scan for follow-up photos
pub const LOOKUP_EXTRA_MEDIA_LIMIT: usize = 5;
/// Upper bound honored for bot "wait N seconds" notices
pub const LOOKUP_MAX_WAIT_NOTICE_SECS: u64 = 30;

// Telegram transport retry configuration
/// Initial backoff for transport retries in milliseconds
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling for transport retries in milliseconds
pub const TRANSPORT_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum transport retry attempts
pub const TRANSPORT_MAX_RETRIES: usize = 3;

/// Returns the maximum number of callers allowed to wait for the bot session.
///
/// Reads `LOOKUP_QUEUE_CAPACITY`, defaulting to 8.
#[must_use]
pub fn get_lookup_queue_capacity() -> usize {
    std::env::var("LOOKUP_QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8)
}

/// Returns the default API key lifetime in seconds.
///
/// Reads `API_KEY_DEFAULT_TTL_SECS`, defaulting to one hour.
#[must_use]
pub fn get_api_key_default_ttl_secs() -> i64 {
    std::env::var("API_KEY_DEFAULT_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600)
}

/// Returns the cooldown applied to repeated invalid-key attempts, in seconds.
///
/// Reads `INVALID_KEY_COOLDOWN_SECS`, defaulting to 60.
#[must_use]
pub fn get_invalid_key_cooldown_secs() -> u64 {
    std::env::var("INVALID_KEY_COOLDOWN_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Tests run sequentially to avoid environment variable race conditions
    #[test]
    fn test_settings_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("API_ID", "12345");
        env::set_var("API_HASH", "0123456789abcdef0123456789abcdef");
        env::set_var("TARGET_BOT", "@OlimpoDataBot");

        let settings = Settings::new()?;
        assert_eq!(settings.api_id, 12345);
        // Leading `@` is stripped for resolution.
        assert_eq!(settings.target_bot, "OlimpoDataBot");
        assert_eq!(settings.session_file, "dnit.session");

        env::remove_var("API_ID");
        env::remove_var("API_HASH");
        env::remove_var("TARGET_BOT");
        Ok(())
    }

    #[test]
    fn test_tunable_defaults() {
        env::remove_var("LOOKUP_QUEUE_CAPACITY");
        env::remove_var("API_KEY_DEFAULT_TTL_SECS");
        assert_eq!(get_lookup_queue_capacity(), 8);
        assert_eq!(get_api_key_default_ttl_secs(), 3600);
    }
}
