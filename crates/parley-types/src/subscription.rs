//! Subscription, plan, and payment types.
//!
//! Subscription status is lazily derived: every gate check recomputes it
//! from `end_date` relative to the current time. [`Subscription::derived_status`]
//! is the single place that rule lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a subscription.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('active', 'inactive', 'canceled'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Canceled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Inactive => write!(f, "inactive"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("invalid subscription status: '{other}'")),
        }
    }
}

/// A purchasable subscription plan. Managed by admins only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Non-negative price in `currency` units.
    pub price: f64,
    pub currency: String,
    pub duration_days: i64,
}

/// A user's subscription to a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: i64,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
}

impl Subscription {
    /// Status this subscription should hold at `now`.
    ///
    /// Comparisons are strict in both directions, so a subscription whose
    /// `end_date` equals `now` keeps its current status -- an active row
    /// is still active at the boundary second. An inactive row whose
    /// `end_date` has moved into the future (e.g. a renewed end date)
    /// flips back to active. Canceled rows never flip.
    pub fn derived_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        match self.status {
            SubscriptionStatus::Active if self.end_date < now => SubscriptionStatus::Inactive,
            SubscriptionStatus::Inactive if self.end_date > now => SubscriptionStatus::Active,
            current => current,
        }
    }
}

/// A confirmed payment against a subscription. Append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_date: DateTime<Utc>,
    /// Provider payment reference (e.g. the charge id).
    pub payment_method: String,
}

/// Outcome of an entitlement check.
#[derive(Debug, Clone)]
pub enum Entitlement {
    /// At least one subscription is active after recomputation.
    Entitled,
    /// No active subscription; carries the purchasable plan catalog.
    Denied(Vec<SubscriptionPlan>),
}

impl Entitlement {
    pub fn is_entitled(&self) -> bool {
        matches!(self, Entitlement::Entitled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, end_offset: Duration) -> (Subscription, DateTime<Utc>) {
        let now = Utc::now();
        let sub = Subscription {
            id: Uuid::now_v7(),
            user_id: 1,
            plan_id: Uuid::now_v7(),
            start_date: now - Duration::days(30),
            end_date: now + end_offset,
            status,
        };
        (sub, now)
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Canceled,
        ] {
            let parsed: SubscriptionStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_active_past_end_date_demotes() {
        let (sub, now) = subscription(SubscriptionStatus::Active, Duration::seconds(-1));
        assert_eq!(sub.derived_status(now), SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_inactive_with_future_end_date_revives() {
        let (sub, now) = subscription(SubscriptionStatus::Inactive, Duration::days(3));
        assert_eq!(sub.derived_status(now), SubscriptionStatus::Active);
    }

    #[test]
    fn test_end_date_equal_to_now_keeps_status() {
        // Strict comparisons: the boundary second changes nothing.
        let (mut sub, now) = subscription(SubscriptionStatus::Active, Duration::zero());
        sub.end_date = now;
        assert_eq!(sub.derived_status(now), SubscriptionStatus::Active);

        sub.status = SubscriptionStatus::Inactive;
        assert_eq!(sub.derived_status(now), SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_canceled_never_flips() {
        let (sub, now) = subscription(SubscriptionStatus::Canceled, Duration::days(30));
        assert_eq!(sub.derived_status(now), SubscriptionStatus::Canceled);
    }
}
