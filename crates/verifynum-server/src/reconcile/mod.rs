//! Checkout-to-credit reconciliation.

pub mod checkout;
pub mod messages;
pub mod poller;
pub mod verify;
pub mod webhook;

pub use checkout::{
    CheckoutError, CheckoutInitiator, CheckoutRequest, CheckoutResponse, CheckoutSettings,
};
pub use messages::{
    pending_message, status_message, FailureMessage, Locale, PaymentFailureReason, Severity,
};
pub use poller::{
    Clock, CreditSignal, LocalVerifySource, PollOutcome, PollerConfig, SourceError, TokioClock,
    TopupPoller, VerifySource,
};
pub use verify::{SyncVerifier, VerifyError, VerifyResponse};
pub use webhook::{Delivery, OutcomeKind, WebhookError, WebhookOutcome, WebhookReconciler};
