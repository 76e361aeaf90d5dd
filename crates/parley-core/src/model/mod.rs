//! Model provider abstraction.
//!
//! [`provider::ModelProvider`] is the seam all model backends implement;
//! [`box_provider::BoxModelProvider`] erases the concrete type so the
//! orchestrator can hold whichever provider configuration selected.

pub mod box_provider;
pub mod provider;

pub use box_provider::BoxModelProvider;
pub use provider::{FragmentStream, ImageGenerator, ModelProvider};
