//! SQLite subscription repository implementation.
//!
//! Plans, subscriptions, and the append-only payment trail. Status is
//! stored as written; the access gate owns recomputation.

use sqlx::Row;
use uuid::Uuid;

use parley_core::repository::subscription::SubscriptionRepository;
use parley_types::error::RepositoryError;
use parley_types::subscription::{Payment, Subscription, SubscriptionPlan, SubscriptionStatus};

use super::pool::DatabasePool;
use super::user::{format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `SubscriptionRepository`.
pub struct SqliteSubscriptionRepository {
    pool: DatabasePool,
}

impl SqliteSubscriptionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct PlanRow {
    id: String,
    name: String,
    description: Option<String>,
    price: f64,
    currency: String,
    duration_days: i64,
}

impl PlanRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            duration_days: row.try_get("duration_days")?,
        })
    }

    fn into_plan(self) -> Result<SubscriptionPlan, RepositoryError> {
        Ok(SubscriptionPlan {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            price: self.price,
            currency: self.currency,
            duration_days: self.duration_days,
        })
    }
}

struct SubscriptionRow {
    id: String,
    user_id: i64,
    plan_id: String,
    start_date: String,
    end_date: String,
    status: String,
}

impl SubscriptionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            plan_id: row.try_get("plan_id")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status: row.try_get("status")?,
        })
    }

    fn into_subscription(self) -> Result<Subscription, RepositoryError> {
        let status: SubscriptionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        Ok(Subscription {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            plan_id: parse_uuid(&self.plan_id)?,
            start_date: parse_datetime(&self.start_date)?,
            end_date: parse_datetime(&self.end_date)?,
            status,
        })
    }
}

struct PaymentRow {
    id: String,
    subscription_id: String,
    amount: f64,
    currency: String,
    payment_date: String,
    payment_method: String,
}

impl PaymentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            subscription_id: row.try_get("subscription_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            payment_date: row.try_get("payment_date")?,
            payment_method: row.try_get("payment_method")?,
        })
    }

    fn into_payment(self) -> Result<Payment, RepositoryError> {
        Ok(Payment {
            id: parse_uuid(&self.id)?,
            subscription_id: parse_uuid(&self.subscription_id)?,
            amount: self.amount,
            currency: self.currency,
            payment_date: parse_datetime(&self.payment_date)?,
            payment_method: self.payment_method,
        })
    }
}

// ---------------------------------------------------------------------------
// SubscriptionRepository impl
// ---------------------------------------------------------------------------

impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn create_plan(&self, plan: &SubscriptionPlan) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO subscription_plans
               (id, name, description, price, currency, duration_days)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(plan.id.to_string())
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price)
        .bind(&plan.currency)
        .bind(plan.duration_days)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_plan(&self, plan_id: &Uuid) -> Result<Option<SubscriptionPlan>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM subscription_plans WHERE id = ?")
            .bind(plan_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r =
                    PlanRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_plan()?))
            }
            None => Ok(None),
        }
    }

    async fn get_plan_by_name(
        &self,
        name: &str,
    ) -> Result<Option<SubscriptionPlan>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM subscription_plans WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r =
                    PlanRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_plan()?))
            }
            None => Ok(None),
        }
    }

    async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM subscription_plans ORDER BY price ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = PlanRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            plans.push(r.into_plan()?);
        }
        Ok(plans)
    }

    async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE subscription_plans
               SET name = ?, description = ?, price = ?, currency = ?, duration_days = ?
               WHERE id = ?"#,
        )
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price)
        .bind(&plan.currency)
        .bind(plan.duration_days)
        .bind(plan.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_plan(&self, plan_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM subscription_plans WHERE id = ?")
            .bind(plan_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| match e {
                // FK restriction: plans with live subscriptions stay.
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    RepositoryError::Conflict("plan has subscriptions".to_string())
                }
                other => RepositoryError::Query(other.to_string()),
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO subscriptions
               (id, user_id, plan_id, start_date, end_date, status)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(subscription.id.to_string())
        .bind(subscription.user_id)
        .bind(subscription.plan_id.to_string())
        .bind(format_datetime(&subscription.start_date))
        .bind(format_datetime(&subscription.end_date))
        .bind(subscription.status.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM subscriptions WHERE user_id = ? ORDER BY start_date ASC")
                .bind(user_id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut subscriptions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = SubscriptionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            subscriptions.push(r.into_subscription()?);
        }
        Ok(subscriptions)
    }

    async fn update_subscription_status(
        &self,
        subscription_id: &Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE subscriptions SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(subscription_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_payment(&self, payment: &Payment) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO payments
               (id, subscription_id, amount, currency, payment_date, payment_method)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payment.id.to_string())
        .bind(payment.subscription_id.to_string())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(format_datetime(&payment.payment_date))
        .bind(&payment.payment_method)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_payments(&self, subscription_id: &Uuid) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM payments WHERE subscription_id = ? ORDER BY payment_date ASC",
        )
        .bind(subscription_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut payments = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = PaymentRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            payments.push(r.into_payment()?);
        }
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;
    use crate::sqlite::user::SqliteUserRepository;
    use chrono::{Duration, Utc};
    use parley_core::repository::user::UserRepository;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_plan(name: &str, price: f64) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: Some("test plan".to_string()),
            price,
            currency: "USD".to_string(),
            duration_days: 30,
        }
    }

    #[tokio::test]
    async fn test_plan_crud() {
        let repo = SqliteSubscriptionRepository::new(test_pool().await);

        let mut plan = make_plan("Monthly", 9.99);
        repo.create_plan(&plan).await.unwrap();

        let fetched = repo.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Monthly");
        assert_eq!(fetched.price, 9.99);

        plan.price = 12.49;
        repo.update_plan(&plan).await.unwrap();
        let fetched = repo.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.price, 12.49);

        repo.delete_plan(&plan.id).await.unwrap();
        assert!(repo.get_plan(&plan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_plan_is_not_found() {
        let repo = SqliteSubscriptionRepository::new(test_pool().await);
        let err = repo.delete_plan(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_trial_plan_found_by_name() {
        let repo = SqliteSubscriptionRepository::new(test_pool().await);
        // Seeded by the initial migration.
        let trial = repo.get_plan_by_name("Trial").await.unwrap().unwrap();
        assert_eq!(trial.price, 0.0);
        assert_eq!(trial.duration_days, 7);
    }

    #[tokio::test]
    async fn test_plans_listed_cheapest_first() {
        let repo = SqliteSubscriptionRepository::new(test_pool().await);
        repo.create_plan(&make_plan("Yearly", 99.0)).await.unwrap();
        repo.create_plan(&make_plan("Monthly", 9.99)).await.unwrap();

        let plans = repo.list_plans().await.unwrap();
        // Trial (0.0, seeded) first, then Monthly, then Yearly.
        assert_eq!(plans[0].name, "Trial");
        assert_eq!(plans[1].name, "Monthly");
        assert_eq!(plans[2].name, "Yearly");
    }

    #[tokio::test]
    async fn test_subscription_roundtrip_and_status_update() {
        let pool = test_pool().await;
        SqliteUserRepository::new(pool.clone())
            .upsert_user(42, "Ada")
            .await
            .unwrap();
        let repo = SqliteSubscriptionRepository::new(pool);

        let plan = make_plan("Monthly", 9.99);
        repo.create_plan(&plan).await.unwrap();

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            user_id: 42,
            plan_id: plan.id,
            start_date: now,
            end_date: now + Duration::days(30),
            status: SubscriptionStatus::Active,
        };
        repo.create_subscription(&subscription).await.unwrap();

        let listed = repo.list_subscriptions(42).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, SubscriptionStatus::Active);

        repo.update_subscription_status(&subscription.id, SubscriptionStatus::Inactive)
            .await
            .unwrap();
        let listed = repo.list_subscriptions(42).await.unwrap();
        assert_eq!(listed[0].status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_payment_trail() {
        let pool = test_pool().await;
        SqliteUserRepository::new(pool.clone())
            .upsert_user(42, "Ada")
            .await
            .unwrap();
        let repo = SqliteSubscriptionRepository::new(pool);

        let plan = make_plan("Monthly", 9.99);
        repo.create_plan(&plan).await.unwrap();
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            user_id: 42,
            plan_id: plan.id,
            start_date: now,
            end_date: now + Duration::days(30),
            status: SubscriptionStatus::Active,
        };
        repo.create_subscription(&subscription).await.unwrap();

        repo.create_payment(&Payment {
            id: Uuid::now_v7(),
            subscription_id: subscription.id,
            amount: 9.99,
            currency: "USD".to_string(),
            payment_date: now,
            payment_method: "charge_abc123".to_string(),
        })
        .await
        .unwrap();

        let payments = repo.list_payments(&subscription.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_method, "charge_abc123");
    }

    #[tokio::test]
    async fn test_update_unknown_subscription_is_not_found() {
        let repo = SqliteSubscriptionRepository::new(test_pool().await);
        let err = repo
            .update_subscription_status(&Uuid::now_v7(), SubscriptionStatus::Canceled)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
