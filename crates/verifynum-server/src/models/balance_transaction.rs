//! Append-only balance transaction log.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Kinds of balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "balance_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credit from a completed payment.
    Topup,
    /// Manual credit by an operator.
    AdminCredit,
    /// Debit for a number purchase.
    Purchase,
    /// Credit returned for a canceled or timed-out number.
    Refund,
}

/// Where a transaction originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Checkout provider webhook.
    Polar,
    /// Admin HTTP endpoint.
    AdminApi,
    /// Operator CLI.
    AdminScript,
}

/// An immutable ledger entry. `new_balance = previous_balance + total_credits`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTransaction {
    pub transaction_id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: TransactionType,
    /// Face value of the payment (pre-bonus) or debit amount.
    pub amount: BigDecimal,
    pub bonus_amount: BigDecimal,
    /// Signed balance delta.
    pub total_credits: BigDecimal,
    pub previous_balance: BigDecimal,
    pub new_balance: BigDecimal,
    pub checkout_id: Option<String>,
    pub package_id: Option<String>,
    pub source: TransactionSource,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A balance mutation to apply. Snapshots are filled in by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBalanceTransaction {
    pub user_id: String,
    pub kind: TransactionType,
    pub amount: BigDecimal,
    pub bonus_amount: BigDecimal,
    pub total_credits: BigDecimal,
    /// When set, the store claims an idempotency record for this id in
    /// the same atomic update.
    pub checkout_id: Option<String>,
    pub package_id: Option<String>,
    pub source: TransactionSource,
    /// Event type recorded on the idempotency record.
    pub event_type: Option<String>,
    pub note: Option<String>,
}

impl NewBalanceTransaction {
    /// A top-up credit from a paid checkout.
    pub fn topup(
        user_id: String,
        amount: BigDecimal,
        bonus_amount: BigDecimal,
        total_credits: BigDecimal,
        checkout_id: String,
        package_id: String,
        event_type: &str,
    ) -> Self {
        Self {
            user_id,
            kind: TransactionType::Topup,
            amount,
            bonus_amount,
            total_credits,
            checkout_id: Some(checkout_id),
            package_id: Some(package_id),
            source: TransactionSource::Polar,
            event_type: Some(event_type.to_string()),
            note: None,
        }
    }

    /// An operator credit. Not tied to a checkout, so not idempotent.
    pub fn admin_credit(
        user_id: String,
        amount: BigDecimal,
        source: TransactionSource,
        note: Option<String>,
    ) -> Self {
        Self {
            user_id,
            kind: TransactionType::AdminCredit,
            bonus_amount: BigDecimal::from(0),
            total_credits: amount.clone(),
            amount,
            checkout_id: None,
            package_id: None,
            source,
            event_type: None,
            note,
        }
    }

    /// Credits must not be negative.
    pub fn is_valid_credit(&self) -> bool {
        self.total_credits >= BigDecimal::from(0)
    }

    /// Materializes the entry given the balance it applies to.
    pub fn into_transaction(
        self,
        transaction_id: Uuid,
        previous_balance: BigDecimal,
        created_at: DateTime<Utc>,
    ) -> BalanceTransaction {
        let new_balance = &previous_balance + &self.total_credits;
        BalanceTransaction {
            transaction_id,
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            bonus_amount: self.bonus_amount,
            total_credits: self.total_credits,
            previous_balance,
            new_balance,
            checkout_id: self.checkout_id,
            package_id: self.package_id,
            source: self.source,
            note: self.note,
            created_at,
        }
    }
}

/// Result of replaying an account's log against its stored balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub stored_balance: BigDecimal,
    pub replayed_balance: BigDecimal,
    pub transaction_count: usize,
    /// First entry whose snapshots do not chain onto its predecessor.
    pub first_drift: Option<Uuid>,
    pub consistent: bool,
}

/// Replays `transactions` (oldest first) from a zero opening balance.
pub fn audit(stored_balance: BigDecimal, transactions: &[BalanceTransaction]) -> AuditReport {
    let mut running = BigDecimal::from(0);
    let mut first_drift = None;

    for tx in transactions {
        let chained = tx.previous_balance == running
            && tx.new_balance == &tx.previous_balance + &tx.total_credits;
        if !chained && first_drift.is_none() {
            first_drift = Some(tx.transaction_id);
        }
        running = &running + &tx.total_credits;
    }

    let consistent = first_drift.is_none() && running == stored_balance;
    AuditReport {
        stored_balance,
        replayed_balance: running,
        transaction_count: transactions.len(),
        first_drift,
        consistent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn topup(total: &str) -> NewBalanceTransaction {
        NewBalanceTransaction::topup(
            "uid_1".to_string(),
            dec("15"),
            dec("1.50"),
            dec(total),
            "chk_1".to_string(),
            "balance_15".to_string(),
            "order.paid",
        )
    }

    #[test]
    fn test_type_and_source_serialization() {
        assert_eq!(
            serde_json::to_string(&TransactionType::AdminCredit).unwrap(),
            "\"admin_credit\""
        );
        assert_eq!(serde_json::to_string(&TransactionType::Topup).unwrap(), "\"topup\"");
        assert_eq!(serde_json::to_string(&TransactionSource::Polar).unwrap(), "\"polar\"");
        assert_eq!(
            serde_json::from_str::<TransactionSource>("\"admin_script\"").unwrap(),
            TransactionSource::AdminScript
        );
    }

    #[test]
    fn test_topup_constructor() {
        let tx = topup("16.50");
        assert_eq!(tx.kind, TransactionType::Topup);
        assert_eq!(tx.source, TransactionSource::Polar);
        assert_eq!(tx.checkout_id.as_deref(), Some("chk_1"));
        assert_eq!(tx.event_type.as_deref(), Some("order.paid"));
        assert!(tx.is_valid_credit());
    }

    #[test]
    fn test_admin_credit_has_no_bonus_or_checkout() {
        let tx = NewBalanceTransaction::admin_credit(
            "uid_1".to_string(),
            dec("20"),
            TransactionSource::AdminApi,
            Some("goodwill".to_string()),
        );
        assert_eq!(tx.kind, TransactionType::AdminCredit);
        assert_eq!(tx.bonus_amount, dec("0"));
        assert_eq!(tx.total_credits, dec("20"));
        assert!(tx.checkout_id.is_none());
    }

    #[test]
    fn test_negative_credit_is_invalid() {
        assert!(!topup("-1").is_valid_credit());
    }

    #[test]
    fn test_into_transaction_snapshots() {
        let tx = topup("16.50").into_transaction(Uuid::new_v4(), dec("4.00"), Utc::now());
        assert_eq!(tx.previous_balance, dec("4.00"));
        assert_eq!(tx.new_balance, dec("20.50"));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "topup");
        assert_eq!(json["checkoutId"], "chk_1");
    }

    #[test]
    fn test_audit_consistent_chain() {
        let first = topup("16.50").into_transaction(Uuid::new_v4(), dec("0"), Utc::now());
        let second = topup("5.25").into_transaction(Uuid::new_v4(), dec("16.50"), Utc::now());
        let report = audit(dec("21.75"), &[first, second]);
        assert!(report.consistent);
        assert_eq!(report.replayed_balance, dec("21.75"));
        assert_eq!(report.transaction_count, 2);
    }

    #[test]
    fn test_audit_detects_broken_chain() {
        let first = topup("16.50").into_transaction(Uuid::new_v4(), dec("0"), Utc::now());
        let second = topup("5.25").into_transaction(Uuid::new_v4(), dec("10"), Utc::now());
        let second_id = second.transaction_id;
        let report = audit(dec("21.75"), &[first, second]);
        assert!(!report.consistent);
        assert_eq!(report.first_drift, Some(second_id));
    }

    #[test]
    fn test_audit_detects_stored_balance_drift() {
        let only = topup("16.50").into_transaction(Uuid::new_v4(), dec("0"), Utc::now());
        let report = audit(dec("100"), &[only]);
        assert!(!report.consistent);
        assert!(report.first_drift.is_none());
    }
}
