//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use verifynum_signing::{SignatureError, WebhookSecret, DEFAULT_TOLERANCE_SECS};

use crate::config::Config;
use crate::provider::PaymentProvider;
use crate::reconcile::{CheckoutInitiator, CheckoutSettings, SyncVerifier, WebhookReconciler};
use crate::store::{BalanceStore, IdempotencyLedger};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BalanceStore>,
    pub checkout: Arc<CheckoutInitiator>,
    pub verifier: Arc<SyncVerifier>,
    pub reconciler: Arc<WebhookReconciler>,
    pub admin_token: Option<Arc<str>>,
    pub store_timeout: Duration,
}

impl AppState {
    /// Wires the components. `provider` is `None` in development checkout
    /// mode.
    pub fn new(
        config: &Config,
        store: Arc<dyn BalanceStore>,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Result<Self, SignatureError> {
        let secret = config
            .polar
            .webhook_secret
            .as_deref()
            .map(WebhookSecret::parse)
            .transpose()?;

        let settings = CheckoutSettings {
            public_app_url: config.checkout.public_app_url.clone(),
            product_id: config.polar.product_id.clone(),
            price_id: config.polar.price_id.clone(),
            min_custom_amount: config.checkout.min_custom_amount.clone(),
            max_custom_amount: config.checkout.max_custom_amount.clone(),
        };

        Ok(Self {
            checkout: Arc::new(CheckoutInitiator::new(provider.clone(), settings)),
            verifier: Arc::new(SyncVerifier::new(
                provider,
                IdempotencyLedger::new(store.clone()),
            )),
            reconciler: Arc::new(WebhookReconciler::new(
                store.clone(),
                secret,
                DEFAULT_TOLERANCE_SECS,
                config.store_timeout,
            )),
            admin_token: config.admin_token.as_deref().map(Arc::from),
            store_timeout: config.store_timeout,
            store,
        })
    }
}
