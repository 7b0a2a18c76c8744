//! Domain models for the balance ledger.

pub mod account;
pub mod balance_package;
pub mod balance_transaction;
pub mod processed_checkout;

pub use account::Account;
pub use balance_package::{
    bonus_percent, decimal_places, find_package, is_bounded_amount, packages, BalancePackage,
    CreditQuote, CUSTOM_PACKAGE_ID,
};
pub use balance_transaction::{
    audit, AuditReport, BalanceTransaction, NewBalanceTransaction, TransactionSource,
    TransactionType,
};
pub use processed_checkout::ProcessedCheckout;
