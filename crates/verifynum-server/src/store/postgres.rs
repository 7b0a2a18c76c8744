//! PostgreSQL-backed Balance Store.

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    check_credit, BalanceChange, BalanceStore, CreditOutcome, StoreError, CHANGE_CHANNEL_CAPACITY,
};
use crate::models::{BalanceTransaction, NewBalanceTransaction, ProcessedCheckout};

/// NOTIFY channel carrying JSON-encoded [`BalanceChange`]s.
pub const BALANCE_CHANNEL: &str = "balance_changed";

/// Serialization failures and deadlocks are retried this many times.
const MAX_CREDIT_ATTEMPTS: u32 = 3;

const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, type, amount, bonus_amount, \
     total_credits, previous_balance, new_balance, checkout_id, package_id, source, note, \
     created_at";

pub struct PgBalanceStore {
    pool: PgPool,
    changes: broadcast::Sender<BalanceChange>,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    /// Forwards `balance_changed` notifications from every server instance
    /// to local subscribers. Runs until the pool is closed.
    pub fn spawn_change_listener(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let changes = self.changes.clone();

        tokio::spawn(async move {
            let mut listener = loop {
                match PgListener::connect_with(&pool).await {
                    Ok(mut listener) => match listener.listen(BALANCE_CHANNEL).await {
                        Ok(()) => break listener,
                        Err(e) => tracing::warn!(error = %e, "Failed to LISTEN, retrying"),
                    },
                    Err(e) if pool.is_closed() => {
                        tracing::info!(error = %e, "Pool closed, balance listener exiting");
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to connect balance listener"),
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            };

            tracing::info!(channel = BALANCE_CHANNEL, "Balance change listener started");

            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<BalanceChange>(notification.payload()) {
                            Ok(change) => {
                                let _ = changes.send(change);
                            }
                            Err(e) => tracing::warn!(
                                error = %e,
                                payload = notification.payload(),
                                "Ignoring malformed balance notification"
                            ),
                        }
                    }
                    Err(e) if pool.is_closed() => {
                        tracing::info!(error = %e, "Pool closed, balance listener exiting");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Balance listener error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    /// One attempt at the atomic credit. Rolls back on any error.
    async fn try_apply_credit(
        &self,
        credit: &NewBalanceTransaction,
    ) -> Result<CreditOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let transaction_id = Uuid::new_v4();

        // Claim the idempotency record first. A concurrent claim for the
        // same checkout blocks here until the other transaction settles.
        if let Some(checkout_id) = &credit.checkout_id {
            let claimed: Option<String> = sqlx::query_scalar(
                r#"
                INSERT INTO processed_checkouts
                    (checkout_id, processed_at, event_type, user_id, total_credits, transaction_id)
                VALUES ($1, NOW(), $2, $3, $4, $5)
                ON CONFLICT (checkout_id) DO NOTHING
                RETURNING checkout_id
                "#,
            )
            .bind(checkout_id)
            .bind(credit.event_type.as_deref().unwrap_or_default())
            .bind(&credit.user_id)
            .bind(&credit.total_credits)
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await?;

            if claimed.is_none() {
                tx.rollback().await?;
                let existing = self.processed_checkout(checkout_id).await?.ok_or_else(|| {
                    StoreError::Unavailable(format!(
                        "processed checkout {} vanished after conflict",
                        checkout_id
                    ))
                })?;
                return Ok(CreditOutcome::AlreadyProcessed(existing));
            }
        }

        let previous_balance = lock_balance(&mut tx, &credit.user_id).await?;
        let now = Utc::now();
        let entry = credit
            .clone()
            .into_transaction(transaction_id, previous_balance, now);

        sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.new_balance)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO balance_transactions
                (transaction_id, user_id, type, amount, bonus_amount, total_credits,
                 previous_balance, new_balance, checkout_id, package_id, source, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.transaction_id)
        .bind(&entry.user_id)
        .bind(entry.kind)
        .bind(&entry.amount)
        .bind(&entry.bonus_amount)
        .bind(&entry.total_credits)
        .bind(&entry.previous_balance)
        .bind(&entry.new_balance)
        .bind(&entry.checkout_id)
        .bind(&entry.package_id)
        .bind(entry.source)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&BalanceChange::from_transaction(&entry))
            .map_err(|e| StoreError::Unavailable(format!("encode notification: {}", e)))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(BALANCE_CHANNEL)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CreditOutcome::Applied(entry))
    }
}

/// Ensures the account row exists and locks it for the rest of the
/// transaction, returning the current balance.
async fn lock_balance(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
) -> Result<BigDecimal, StoreError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (user_id, balance, created_at, updated_at)
        VALUES ($1, 0, NOW(), NOW())
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    let balance: BigDecimal = sqlx::query_scalar(
        r#"
        SELECT balance
        FROM accounts
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(balance)
}

/// Serialization failure or deadlock: safe to retry the whole transaction.
fn is_retryable(err: &StoreError) -> bool {
    match err {
        StoreError::Database(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn get_balance(&self, user_id: &str) -> Result<BigDecimal, StoreError> {
        let balance: Option<BigDecimal> = sqlx::query_scalar(
            r#"
            SELECT balance
            FROM accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn apply_credit(
        &self,
        credit: NewBalanceTransaction,
    ) -> Result<CreditOutcome, StoreError> {
        check_credit(&credit)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_apply_credit(&credit).await {
                Err(e) if is_retryable(&e) && attempt < MAX_CREDIT_ATTEMPTS => {
                    tracing::warn!(
                        user_id = %credit.user_id,
                        checkout_id = ?credit.checkout_id,
                        attempt,
                        error = %e,
                        "Retrying conflicting credit"
                    );
                }
                Err(e) if is_retryable(&e) => {
                    return Err(StoreError::Contention { attempts: attempt });
                }
                other => return other,
            }
        }
    }

    async fn processed_checkout(
        &self,
        checkout_id: &str,
    ) -> Result<Option<ProcessedCheckout>, StoreError> {
        let record: Option<ProcessedCheckout> = sqlx::query_as(
            r#"
            SELECT checkout_id, processed_at, event_type, user_id, total_credits, transaction_id
            FROM processed_checkouts
            WHERE checkout_id = $1
            "#,
        )
        .bind(checkout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn transactions(&self, user_id: &str) -> Result<Vec<BalanceTransaction>, StoreError> {
        let query = format!(
            "SELECT {} FROM balance_transactions WHERE user_id = $1 ORDER BY seq ASC",
            TRANSACTION_COLUMNS
        );
        let rows: Vec<BalanceTransaction> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    fn subscribe(&self) -> broadcast::Receiver<BalanceChange> {
        self.changes.subscribe()
    }
}
