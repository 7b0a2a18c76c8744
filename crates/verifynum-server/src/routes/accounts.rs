//! Balance read surface: balance, history, live changes, audit.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};

use crate::error::AppError;
use crate::models::{audit, AuditReport, BalanceTransaction};
use crate::state::AppState;

/// Upper bound on `?limit=` for transaction listings.
const MAX_TRANSACTIONS: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Creates the accounts router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{user_id}/balance", get(get_balance))
        .route("/{user_id}/balance/stream", get(stream_balance))
        .route("/{user_id}/transactions", get(list_transactions))
        .route("/{user_id}/audit", get(audit_account))
        .with_state(state)
}

async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.store.get_balance(&user_id).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

/// Newest first.
async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<BalanceTransaction>>, AppError> {
    let limit = query.limit.unwrap_or(MAX_TRANSACTIONS).min(MAX_TRANSACTIONS);
    let mut transactions = state.store.transactions(&user_id).await?;
    transactions.reverse();
    transactions.truncate(limit);
    Ok(Json(transactions))
}

/// Replays the log and compares it with the stored balance.
async fn audit_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AuditReport>, AppError> {
    let balance = state.store.get_balance(&user_id).await?;
    let transactions = state.store.transactions(&user_id).await?;
    let report = audit(balance, &transactions);
    if !report.consistent {
        tracing::error!(
            user_id = %user_id,
            stored_balance = %report.stored_balance,
            replayed_balance = %report.replayed_balance,
            "Balance drift detected"
        );
    }
    Ok(Json(report))
}

/// Server-Sent Events: a `snapshot` of the current balance, then one
/// `balance` event per committed change for this account.
async fn stream_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before reading so no change falls between the two.
    let changes = BroadcastStream::new(state.store.subscribe());
    let balance = state.store.get_balance(&user_id).await?;

    let snapshot = Event::default()
        .event("snapshot")
        .json_data(BalanceResponse {
            user_id: user_id.clone(),
            balance,
        })
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let changes = changes.filter_map(move |message| match message {
        Ok(change) if change.user_id == user_id => {
            Event::default().event("balance").json_data(&change).ok().map(Ok)
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Ok(Event::default()
            .event("lagged")
            .data(skipped.to_string()))),
    });

    let stream = tokio_stream::once(Ok(snapshot)).chain(changes);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
