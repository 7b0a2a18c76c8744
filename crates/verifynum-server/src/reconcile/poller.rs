//! Client Reconciliation Poller: waits for a paid checkout's credit to
//! become visible, via the real-time feed or a bounded verify loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::messages::Locale;
use super::verify::{SyncVerifier, VerifyResponse};
use crate::provider::CheckoutStatus;
use crate::store::{BalanceChange, IdempotencyLedger};

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SourceError(pub String);

/// Where the poller gets its status from.
#[async_trait]
pub trait VerifySource: Send + Sync {
    async fn verify(&self) -> Result<VerifyResponse, SourceError>;

    /// Current balance, when the source can read it.
    async fn balance(&self) -> Result<Option<BigDecimal>, SourceError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSignal {
    Verifier,
    BalancePoll,
    Realtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Credited { via: CreditSignal },
    /// The checkout expired or failed.
    Failed { status: CheckoutStatus },
    /// Bound exceeded without observing the credit. The payment is still safe.
    Pending { attempts: u32 },
    Cancelled,
}

pub struct TopupPoller<C> {
    config: PollerConfig,
    clock: C,
}

impl TopupPoller<TokioClock> {
    pub fn new(config: PollerConfig) -> Self {
        Self::with_clock(config, TokioClock)
    }
}

impl<C: Clock> TopupPoller<C> {
    pub fn with_clock(config: PollerConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Runs until the credit is observed, the checkout fails, the attempt
    /// bound is hit, or `cancel` fires. No source calls are made after it
    /// returns.
    pub async fn run(
        &self,
        user_id: &str,
        source: &dyn VerifySource,
        mut feed: Option<broadcast::Receiver<BalanceChange>>,
        cancel: CancellationToken,
    ) -> PollOutcome {
        let initial_balance = match source.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::debug!(error = %e, "Initial balance unavailable");
                None
            }
        };

        if let Some(outcome) = check_verify(source).await {
            return outcome;
        }

        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            let sleep = self.clock.sleep(self.config.interval);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PollOutcome::Cancelled,
                    change = next_change(&mut feed) => {
                        if is_credit_for(&change, user_id, initial_balance.as_ref()) {
                            tracing::info!(
                                user_id,
                                new_balance = %change.new_balance,
                                "Credit observed in real time"
                            );
                            return PollOutcome::Credited { via: CreditSignal::Realtime };
                        }
                    }
                    _ = &mut sleep => break,
                }
            }

            attempts += 1;
            tracing::debug!(user_id, attempts, "Polling for credit");

            if let Some(outcome) = check_verify(source).await {
                return outcome;
            }
            if let (Some(initial), Ok(Some(current))) = (&initial_balance, source.balance().await) {
                if &current > initial {
                    return PollOutcome::Credited {
                        via: CreditSignal::BalancePoll,
                    };
                }
            }
        }

        tracing::info!(user_id, attempts, "Credit not observed within bound, leaving pending");
        PollOutcome::Pending { attempts }
    }
}

/// `Some` when the verifier's answer ends the wait.
async fn check_verify(source: &dyn VerifySource) -> Option<PollOutcome> {
    match source.verify().await {
        Ok(response) if response.balance_updated == Some(true) => Some(PollOutcome::Credited {
            via: CreditSignal::Verifier,
        }),
        Ok(response) if response.terminal || response.status.is_terminal_failure() => {
            Some(PollOutcome::Failed {
                status: response.status,
            })
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Verification failed, still pending");
            None
        }
    }
}

fn is_credit_for(change: &BalanceChange, user_id: &str, initial: Option<&BigDecimal>) -> bool {
    change.user_id == user_id
        && match initial {
            Some(initial) => &change.new_balance > initial,
            None => change.new_balance > change.previous_balance,
        }
}

async fn next_change(feed: &mut Option<broadcast::Receiver<BalanceChange>>) -> BalanceChange {
    loop {
        let Some(rx) = feed.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(change) => return change,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Balance feed lagged");
            }
            Err(RecvError::Closed) => *feed = None,
        }
    }
}

/// Verify source backed by the in-process verifier.
pub struct LocalVerifySource {
    verifier: Arc<SyncVerifier>,
    ledger: IdempotencyLedger,
    checkout_id: String,
    user_id: String,
    locale: Locale,
}

impl LocalVerifySource {
    pub fn new(
        verifier: Arc<SyncVerifier>,
        ledger: IdempotencyLedger,
        checkout_id: impl Into<String>,
        user_id: impl Into<String>,
        locale: Locale,
    ) -> Self {
        Self {
            verifier,
            ledger,
            checkout_id: checkout_id.into(),
            user_id: user_id.into(),
            locale,
        }
    }
}

#[async_trait]
impl VerifySource for LocalVerifySource {
    async fn verify(&self) -> Result<VerifyResponse, SourceError> {
        self.verifier
            .verify(&self.checkout_id, &self.user_id, self.locale)
            .await
            .map_err(|e| SourceError(e.to_string()))
    }

    async fn balance(&self) -> Result<Option<BigDecimal>, SourceError> {
        self.ledger
            .balance(&self.user_id)
            .await
            .map(Some)
            .map_err(|e| SourceError(e.to_string()))
    }
}
