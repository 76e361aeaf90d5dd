//! SubscriptionRepository trait definition.
//!
//! Covers plans (admin-managed catalog), subscriptions, and the
//! append-only payment trail.

use parley_types::error::RepositoryError;
use parley_types::subscription::{Payment, Subscription, SubscriptionPlan, SubscriptionStatus};
use uuid::Uuid;

/// Repository trait for subscription, plan, and payment persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteSubscriptionRepository`).
pub trait SubscriptionRepository: Send + Sync {
    fn create_plan(
        &self,
        plan: &SubscriptionPlan,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_plan(
        &self,
        plan_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<SubscriptionPlan>, RepositoryError>> + Send;

    /// Look up a plan by name (used for the trial grant on sign-in).
    fn get_plan_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<SubscriptionPlan>, RepositoryError>> + Send;

    fn list_plans(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SubscriptionPlan>, RepositoryError>> + Send;

    fn update_plan(
        &self,
        plan: &SubscriptionPlan,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn delete_plan(
        &self,
        plan_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All subscriptions a user has ever held.
    fn list_subscriptions(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Subscription>, RepositoryError>> + Send;

    /// Persist a lazily recomputed status.
    fn update_subscription_status(
        &self,
        subscription_id: &Uuid,
        status: SubscriptionStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a confirmed payment. Payments are never updated or deleted
    /// individually.
    fn create_payment(
        &self,
        payment: &Payment,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_payments(
        &self,
        subscription_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Payment>, RepositoryError>> + Send;
}
