//! Keyed-record store for subscriber records
//!
//! `UserStore` is the seam between billing logic and persistence. Handlers
//! receive an `Arc<dyn UserStore>` so tests can swap in `InMemoryUserStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{normalize_email, Gateway, PlanUpdate, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_customer_id(
        &self,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<Option<User>>;

    /// Store a gateway customer id unless one is already present.
    /// Returns the number of records changed (0 or 1).
    async fn set_customer_id_if_absent(
        &self,
        user_id: Uuid,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<u64>;

    /// Replace `plan_id`, `plan_expire_date` and `payment_processor` in one write.
    /// Returns the number of records changed (0 or 1).
    async fn apply_plan_update(&self, user_id: Uuid, update: &PlanUpdate) -> StoreResult<u64>;
}

const USER_COLUMNS: &str = "id, email, name, plan_id, plan_expire_date, payment_processor, \
     stripe_customer_id, solidgate_customer_id, created_at, updated_at";

/// Postgres-backed store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, name, plan_id, plan_expire_date, payment_processor,
                 stripe_customer_id, solidgate_customer_id, created_at, updated_at)
            VALUES ($1, LOWER($2), $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.plan_id)
        .bind(user.plan_expire_date)
        .bind(&user.payment_processor)
        .bind(&user.stripe_customer_id)
        .bind(&user.solidgate_customer_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_customer_id(
        &self,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<Option<User>> {
        let column = customer_column(gateway);
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS, column
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_customer_id_if_absent(
        &self,
        user_id: Uuid,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<u64> {
        let column = customer_column(gateway);
        let result = sqlx::query(&format!(
            "UPDATE users SET {col} = $1, updated_at = NOW() WHERE id = $2 AND {col} IS NULL",
            col = column
        ))
        .bind(customer_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn apply_plan_update(&self, user_id: Uuid, update: &PlanUpdate) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET plan_id = $1,
                plan_expire_date = $2,
                payment_processor = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(update.plan_id)
        .bind(update.expires_at)
        .bind(update.processor.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn customer_column(gateway: Gateway) -> &'static str {
    match gateway {
        Gateway::Stripe => "stripe_customer_id",
        Gateway::Solidgate => "solidgate_customer_id",
    }
}

/// In-memory store for tests and local development
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Snapshot of every stored record
    pub async fn all(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let email = normalize_email(&user.email);

        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!(
                "User with email {} already exists",
                email
            )));
        }
        if users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("User {} already exists", user.id)));
        }

        let mut record = user.clone();
        record.email = email;
        users.insert(record.id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_customer_id(
        &self,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.customer_id(gateway) == Some(customer_id))
            .cloned())
    }

    async fn set_customer_id_if_absent(
        &self,
        user_id: Uuid,
        gateway: Gateway,
        customer_id: &str,
    ) -> StoreResult<u64> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(0);
        };

        let slot = match gateway {
            Gateway::Stripe => &mut user.stripe_customer_id,
            Gateway::Solidgate => &mut user.solidgate_customer_id,
        };
        if slot.is_some() {
            return Ok(0);
        }

        *slot = Some(customer_id.to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(1)
    }

    async fn apply_plan_update(&self, user_id: Uuid, update: &PlanUpdate) -> StoreResult<u64> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(0);
        };

        user.plan_id = update.plan_id;
        user.plan_expire_date = Some(update.expires_at);
        user.payment_processor = Some(update.processor.as_str().to_string());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(1)
    }
}
