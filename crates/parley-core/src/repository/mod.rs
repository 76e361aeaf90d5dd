//! Repository trait definitions.
//!
//! Implementations live in parley-infra (SQLite via sqlx). All traits use
//! native async fn in traits (RPITIT, Rust 2024 edition) and return
//! [`parley_types::error::RepositoryError`].

pub mod chat;
pub mod subscription;
pub mod user;

pub use chat::ChatRepository;
pub use subscription::SubscriptionRepository;
pub use user::UserRepository;
