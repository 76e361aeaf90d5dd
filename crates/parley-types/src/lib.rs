//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley bot:
//! users, chats, messages, subscriptions, model requests, configuration,
//! and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod model;
pub mod subscription;
pub mod user;
