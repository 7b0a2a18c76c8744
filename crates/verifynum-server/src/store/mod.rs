//! Balance Store: durable balances, the transaction log, and the
//! idempotency ledger behind a single atomic credit primitive.

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{BalanceTransaction, NewBalanceTransaction, ProcessedCheckout};

pub use memory::MemoryBalanceStore;
pub use postgres::PgBalanceStore;

/// Capacity of the change-notification fan-out.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Storage failures. None of these are ever swallowed on the credit path.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid credit: {0}")]
    InvalidCredit(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gave up after {attempts} conflicting attempts")]
    Contention { attempts: u32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Notification published after a balance mutation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub user_id: String,
    pub previous_balance: BigDecimal,
    pub new_balance: BigDecimal,
    pub transaction_id: Uuid,
}

impl BalanceChange {
    pub fn from_transaction(tx: &BalanceTransaction) -> Self {
        Self {
            user_id: tx.user_id.clone(),
            previous_balance: tx.previous_balance.clone(),
            new_balance: tx.new_balance.clone(),
            transaction_id: tx.transaction_id,
        }
    }
}

/// What `apply_credit` did.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    /// Balance updated and transaction appended.
    Applied(BalanceTransaction),
    /// The checkout already had an idempotency record; nothing written.
    AlreadyProcessed(ProcessedCheckout),
}

impl CreditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CreditOutcome::Applied(_))
    }
}

/// Persistence contract for the ledger.
///
/// `apply_credit` is the only write path for balances. It must read the
/// current balance, write the new balance, append the transaction, and
/// claim the idempotency record (when the credit carries a checkout id)
/// as one indivisible unit.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance; zero for accounts that were never credited.
    async fn get_balance(&self, user_id: &str) -> Result<BigDecimal, StoreError>;

    async fn apply_credit(
        &self,
        credit: NewBalanceTransaction,
    ) -> Result<CreditOutcome, StoreError>;

    async fn processed_checkout(
        &self,
        checkout_id: &str,
    ) -> Result<Option<ProcessedCheckout>, StoreError>;

    async fn has_processed(&self, checkout_id: &str) -> Result<bool, StoreError> {
        Ok(self.processed_checkout(checkout_id).await?.is_some())
    }

    /// All transactions for a user, oldest first.
    async fn transactions(&self, user_id: &str) -> Result<Vec<BalanceTransaction>, StoreError>;

    /// Subscribes to committed balance changes for every account.
    fn subscribe(&self) -> broadcast::Receiver<BalanceChange>;
}

/// Read-only view over the idempotency ledger and balances.
///
/// Handed to components that may observe but never credit.
#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<dyn BalanceStore>,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    pub async fn has_processed(&self, checkout_id: &str) -> Result<bool, StoreError> {
        self.store.has_processed(checkout_id).await
    }

    pub async fn balance(&self, user_id: &str) -> Result<BigDecimal, StoreError> {
        self.store.get_balance(user_id).await
    }
}

pub(crate) fn check_credit(credit: &NewBalanceTransaction) -> Result<(), StoreError> {
    if credit.user_id.trim().is_empty() {
        return Err(StoreError::InvalidCredit("user id is empty".to_string()));
    }
    if !credit.is_valid_credit() {
        return Err(StoreError::InvalidCredit(format!(
            "total credits must not be negative (got {})",
            credit.total_credits
        )));
    }
    Ok(())
}
