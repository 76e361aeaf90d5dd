//! Access gate: subscription checks before any metered feature.
//!
//! Every check recomputes each subscription's status from its end date
//! (read + repair, persisted when changed) and answers Entitled/Denied.
//! Also owns the payment-event and trial-grant paths that create
//! subscriptions in the first place.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use parley_types::error::RepositoryError;
use parley_types::subscription::{
    Entitlement, Payment, Subscription, SubscriptionPlan, SubscriptionStatus,
};

use crate::repository::SubscriptionRepository;

/// Plan name looked up for the first-sign-in trial grant.
const TRIAL_PLAN_NAME: &str = "Trial";

/// Evaluates subscription validity and records entitlement changes.
pub struct AccessGate<S: SubscriptionRepository> {
    subscriptions: S,
}

impl<S: SubscriptionRepository> AccessGate<S> {
    pub fn new(subscriptions: S) -> Self {
        Self { subscriptions }
    }

    /// Access the subscription repository.
    pub fn subscriptions(&self) -> &S {
        &self.subscriptions
    }

    /// Recompute every subscription status for the user, persist any
    /// changes, and answer whether they are currently entitled.
    ///
    /// Mandatory before model invocation, image generation, and any other
    /// metered feature. Pure read + repair: the only side effect is
    /// status normalization.
    pub async fn check_entitlement(&self, user_id: i64) -> Result<Entitlement, RepositoryError> {
        let now = Utc::now();
        let mut any_active = false;

        for subscription in self.subscriptions.list_subscriptions(user_id).await? {
            let derived = subscription.derived_status(now);
            if derived != subscription.status {
                self.subscriptions
                    .update_subscription_status(&subscription.id, derived)
                    .await?;
                info!(
                    user_id,
                    subscription_id = %subscription.id,
                    from = %subscription.status,
                    to = %derived,
                    "subscription status normalized"
                );
            }
            any_active |= derived == SubscriptionStatus::Active;
        }

        if any_active {
            Ok(Entitlement::Entitled)
        } else {
            Ok(Entitlement::Denied(self.subscriptions.list_plans().await?))
        }
    }

    /// Turn a confirmed payment event into a Subscription + Payment pair.
    ///
    /// The subscription runs from now for the plan's duration; the payment
    /// row is the append-only audit record carrying the provider reference.
    pub async fn record_payment(
        &self,
        user_id: i64,
        plan_id: Uuid,
        amount: f64,
        currency: &str,
        payment_reference: &str,
    ) -> Result<(Subscription, SubscriptionPlan), RepositoryError> {
        let plan = self
            .subscriptions
            .get_plan(&plan_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let subscription = self.subscribe(user_id, &plan).await?;

        let payment = Payment {
            id: Uuid::now_v7(),
            subscription_id: subscription.id,
            amount,
            currency: currency.to_string(),
            payment_date: Utc::now(),
            payment_method: payment_reference.to_string(),
        };
        self.subscriptions.create_payment(&payment).await?;

        info!(
            user_id,
            subscription_id = %subscription.id,
            plan = %plan.name,
            amount,
            "payment recorded"
        );
        Ok((subscription, plan))
    }

    /// Grant the free trial on first sign-in. Returns `None` when no
    /// trial plan is configured.
    pub async fn grant_trial(&self, user_id: i64) -> Result<Option<Subscription>, RepositoryError> {
        let Some(plan) = self.subscriptions.get_plan_by_name(TRIAL_PLAN_NAME).await? else {
            return Ok(None);
        };
        let subscription = self.subscribe(user_id, &plan).await?;
        info!(user_id, subscription_id = %subscription.id, "trial granted");
        Ok(Some(subscription))
    }

    async fn subscribe(
        &self,
        user_id: i64,
        plan: &SubscriptionPlan,
    ) -> Result<Subscription, RepositoryError> {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            user_id,
            plan_id: plan.id,
            start_date: now,
            end_date: now + Duration::days(plan.duration_days),
            status: SubscriptionStatus::Active,
        };
        self.subscriptions.create_subscription(&subscription).await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySubscriptionRepo;
    use chrono::Duration;

    fn plan(name: &str, price: f64, days: i64) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            price,
            currency: "USD".to_string(),
            duration_days: days,
        }
    }

    async fn gate_with_plan(
        name: &str,
        price: f64,
    ) -> (AccessGate<MemorySubscriptionRepo>, SubscriptionPlan) {
        let repo = MemorySubscriptionRepo::new();
        let p = plan(name, price, 30);
        repo.create_plan(&p).await.unwrap();
        (AccessGate::new(repo), p)
    }

    #[tokio::test]
    async fn test_no_subscriptions_is_denied_with_catalog() {
        let (gate, plan) = gate_with_plan("Monthly", 9.99).await;
        match gate.check_entitlement(1).await.unwrap() {
            Entitlement::Denied(plans) => {
                assert_eq!(plans.len(), 1);
                assert_eq!(plans[0].id, plan.id);
            }
            Entitlement::Entitled => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_payment_entitles_user() {
        let (gate, plan) = gate_with_plan("Monthly", 9.99).await;
        let (sub, paid_plan) = gate
            .record_payment(1, plan.id, 9.99, "USD", "charge_123")
            .await
            .unwrap();
        assert_eq!(paid_plan.id, plan.id);
        assert_eq!(sub.status, SubscriptionStatus::Active);

        assert!(gate.check_entitlement(1).await.unwrap().is_entitled());

        let payments = gate.subscriptions().list_payments(&sub.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_method, "charge_123");
    }

    #[tokio::test]
    async fn test_payment_for_unknown_plan_fails() {
        let (gate, _plan) = gate_with_plan("Monthly", 9.99).await;
        let err = gate
            .record_payment(1, Uuid::now_v7(), 9.99, "USD", "charge_999")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_expired_subscription_is_lazily_demoted() {
        let (gate, plan) = gate_with_plan("Monthly", 9.99).await;
        let expired = Subscription {
            id: Uuid::now_v7(),
            user_id: 1,
            plan_id: plan.id,
            start_date: Utc::now() - Duration::days(60),
            end_date: Utc::now() - Duration::days(30),
            status: SubscriptionStatus::Active,
        };
        gate.subscriptions()
            .create_subscription(&expired)
            .await
            .unwrap();

        assert!(!gate.check_entitlement(1).await.unwrap().is_entitled());

        let stored = &gate.subscriptions().list_subscriptions(1).await.unwrap()[0];
        assert_eq!(stored.status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_inactive_with_renewed_end_date_reactivates() {
        // The literal reactivation rule: a renewed end_date flips the row
        // back to active on the next check.
        let (gate, plan) = gate_with_plan("Monthly", 9.99).await;
        let renewed = Subscription {
            id: Uuid::now_v7(),
            user_id: 1,
            plan_id: plan.id,
            start_date: Utc::now() - Duration::days(10),
            end_date: Utc::now() + Duration::days(20),
            status: SubscriptionStatus::Inactive,
        };
        gate.subscriptions()
            .create_subscription(&renewed)
            .await
            .unwrap();

        assert!(gate.check_entitlement(1).await.unwrap().is_entitled());
    }

    #[tokio::test]
    async fn test_check_is_idempotent_and_creates_no_rows() {
        let (gate, plan) = gate_with_plan("Monthly", 9.99).await;
        gate.record_payment(1, plan.id, 9.99, "USD", "charge_1")
            .await
            .unwrap();

        let first = gate.check_entitlement(1).await.unwrap().is_entitled();
        let second = gate.check_entitlement(1).await.unwrap().is_entitled();
        assert_eq!(first, second);
        assert_eq!(
            gate.subscriptions().list_subscriptions(1).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_trial_granted_when_trial_plan_exists() {
        let (gate, _plan) = gate_with_plan("Trial", 0.0).await;
        let sub = gate.grant_trial(5).await.unwrap();
        assert!(sub.is_some());
        assert!(gate.check_entitlement(5).await.unwrap().is_entitled());
    }

    #[tokio::test]
    async fn test_trial_skipped_without_trial_plan() {
        let (gate, _plan) = gate_with_plan("Monthly", 9.99).await;
        assert!(gate.grant_trial(5).await.unwrap().is_none());
    }
}
