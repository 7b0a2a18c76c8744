//! In-process Balance Store used for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::{
    check_credit, BalanceChange, BalanceStore, CreditOutcome, StoreError, CHANGE_CHANNEL_CAPACITY,
};
use crate::models::{Account, BalanceTransaction, NewBalanceTransaction, ProcessedCheckout};

#[derive(Default)]
struct Documents {
    accounts: HashMap<String, Account>,
    transactions: HashMap<String, Vec<BalanceTransaction>>,
    processed: HashMap<String, ProcessedCheckout>,
}

/// Document tree kept behind one lock, so every credit is a single
/// critical section covering the idempotency check and all writes.
pub struct MemoryBalanceStore {
    docs: Mutex<Documents>,
    changes: broadcast::Sender<BalanceChange>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            docs: Mutex::new(Documents::default()),
            changes,
        }
    }
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_balance(&self, user_id: &str) -> Result<BigDecimal, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs
            .accounts
            .get(user_id)
            .map(|a| a.balance.clone())
            .unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn apply_credit(
        &self,
        credit: NewBalanceTransaction,
    ) -> Result<CreditOutcome, StoreError> {
        check_credit(&credit)?;

        let mut docs = self.docs.lock().await;

        if let Some(checkout_id) = &credit.checkout_id {
            if let Some(existing) = docs.processed.get(checkout_id) {
                return Ok(CreditOutcome::AlreadyProcessed(existing.clone()));
            }
        }

        let now = Utc::now();
        let user_id = credit.user_id.clone();
        let checkout_id = credit.checkout_id.clone();
        let event_type = credit.event_type.clone();

        let account = docs
            .accounts
            .entry(user_id.clone())
            .or_insert_with(|| Account::new(user_id.clone(), now));
        let tx = credit.into_transaction(Uuid::new_v4(), account.balance.clone(), now);
        account.balance = tx.new_balance.clone();
        account.updated_at = now;

        docs.transactions
            .entry(user_id.clone())
            .or_default()
            .push(tx.clone());

        if let Some(checkout_id) = checkout_id {
            docs.processed.insert(
                checkout_id.clone(),
                ProcessedCheckout {
                    checkout_id,
                    processed_at: now,
                    event_type: event_type.unwrap_or_default(),
                    user_id,
                    total_credits: tx.total_credits.clone(),
                    transaction_id: tx.transaction_id,
                },
            );
        }
        drop(docs);

        // No subscribers is fine.
        let _ = self.changes.send(BalanceChange::from_transaction(&tx));
        Ok(CreditOutcome::Applied(tx))
    }

    async fn processed_checkout(
        &self,
        checkout_id: &str,
    ) -> Result<Option<ProcessedCheckout>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.processed.get(checkout_id).cloned())
    }

    async fn transactions(&self, user_id: &str) -> Result<Vec<BalanceTransaction>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.transactions.get(user_id).cloned().unwrap_or_default())
    }

    fn subscribe(&self) -> broadcast::Receiver<BalanceChange> {
        self.changes.subscribe()
    }
}
