// Waiting for a top-up to land, from the outside of the server

use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use eventsource_stream::{Event, Eventsource};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use verifynum_server::reconcile::{Locale, SourceError, VerifyResponse, VerifySource};
use verifynum_server::store::BalanceChange;

use crate::client::ApiClient;

const FEED_CAPACITY: usize = 16;
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Verify source that calls the HTTP API. Requests run on the blocking pool.
pub struct HttpVerifySource {
    client: ApiClient,
    checkout_id: String,
    user_id: String,
    locale: Locale,
}

impl HttpVerifySource {
    pub fn new(client: ApiClient, checkout_id: String, user_id: String, locale: Locale) -> Self {
        Self {
            client,
            checkout_id,
            user_id,
            locale,
        }
    }
}

#[async_trait]
impl VerifySource for HttpVerifySource {
    async fn verify(&self) -> Result<VerifyResponse, SourceError> {
        let client = self.client.clone();
        let checkout_id = self.checkout_id.clone();
        let user_id = self.user_id.clone();
        let locale = self.locale;
        tokio::task::spawn_blocking(move || client.verify(&checkout_id, &user_id, locale))
            .await
            .map_err(|e| SourceError(e.to_string()))?
            .map_err(|e| SourceError(e.to_string()))
    }

    async fn balance(&self) -> Result<Option<BigDecimal>, SourceError> {
        let client = self.client.clone();
        let user_id = self.user_id.clone();
        tokio::task::spawn_blocking(move || client.balance(&user_id))
            .await
            .map_err(|e| SourceError(e.to_string()))?
            .map(Some)
            .map_err(|e| SourceError(e.to_string()))
    }
}

/// Decodes a `balance` event; anything else is `None`.
pub fn balance_change(event: &Event) -> Option<BalanceChange> {
    if event.event != "balance" {
        return None;
    }
    serde_json::from_str(&event.data).ok()
}

/// Connects to the account's event stream and forwards balance changes
/// until `cancel` fires or the stream ends.
pub async fn spawn_balance_feed(
    client: &ApiClient,
    user_id: &str,
    cancel: CancellationToken,
) -> anyhow::Result<broadcast::Receiver<BalanceChange>> {
    let response = reqwest::Client::builder()
        .connect_timeout(STREAM_CONNECT_TIMEOUT)
        .build()?
        .get(client.url(&format!("/accounts/{}/balance/stream", user_id)))
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    let (tx, rx) = broadcast::channel(FEED_CAPACITY);
    tokio::spawn(forward_balance_events(response.bytes_stream(), tx, cancel));
    Ok(rx)
}

/// Parses an SSE byte stream and publishes every `balance` event.
pub async fn forward_balance_events<S, B, E>(
    bytes: S,
    tx: broadcast::Sender<BalanceChange>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut events = pin!(bytes.eventsource());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => match next {
                Some(Ok(event)) => {
                    if let Some(change) = balance_change(&event) {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                }
                Some(Err(_)) | None => break,
            },
        }
    }
}
