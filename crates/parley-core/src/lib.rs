//! Business logic for Parley: the chat-session and conversational-state
//! orchestrator.
//!
//! This crate defines the repository traits (implemented in parley-infra),
//! the session resolver, the access gate, the attachment ingestor, and the
//! conversation orchestrator that ties them together. It never talks to a
//! database or the network directly -- those concerns live behind the
//! traits defined here.

pub mod attachment;
pub mod gate;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
