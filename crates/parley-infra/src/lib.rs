//! Infrastructure implementations for Parley.
//!
//! Everything parley-core abstracts over lives here: the SQLite
//! repositories, the Telegram Bot API transport, the OpenAI-compatible
//! model provider, document text extraction, and configuration loading.

pub mod config;
pub mod extract;
pub mod openai;
pub mod sqlite;
pub mod telegram;
