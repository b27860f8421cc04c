//! DNI lookup gateway.
//!
//! A thin HTTP façade over a Telegram data bot: callers hit `GET /dnit`,
//! the gateway relays the query over an authenticated Telegram user session,
//! waits for the bot's reply (structured text plus up to four photos) and
//! returns everything as JSON.

pub mod api;
pub mod config;
pub mod dnit;
pub mod keys;
pub mod telegram;
pub mod utils;
