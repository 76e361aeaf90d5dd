//! Telegram Bot API client.
//!
//! A hand-rolled reqwest client against the Bot API: long-poll updates,
//! message delivery and edits, file downloads, inline keyboards, and the
//! invoice/pre-checkout payment flow. [`api::TelegramApi`] implements
//! `parley_core::transport::Transport` so the orchestrator stays
//! platform-agnostic.

pub mod api;
pub mod types;

pub use api::{TelegramApi, TelegramError};
