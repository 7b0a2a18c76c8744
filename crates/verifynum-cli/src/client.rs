// Blocking HTTP client for the balance API

use std::time::Duration;

use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use verifynum_server::models::BalanceTransaction;
use verifynum_server::reconcile::{CheckoutResponse, Locale, VerifyResponse};
use verifynum_server::routes::accounts::BalanceResponse;
use verifynum_server::routes::admin::{AdminCreditResponse, ADMIN_TOKEN_HEADER};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to a running verifynum-server over `/api/v1`.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout_connect(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub fn packages(&self) -> Result<Value> {
        decode(self.agent.get(&self.url("/checkout/packages")).call())
    }

    pub fn checkout(&self, body: &Value) -> Result<CheckoutResponse> {
        decode(self.agent.post(&self.url("/checkout")).send_json(body))
    }

    pub fn verify(
        &self,
        checkout_id: &str,
        user_id: &str,
        locale: Locale,
    ) -> Result<VerifyResponse> {
        decode(self.agent.post(&self.url("/checkout/verify")).send_json(json!({
            "checkoutId": checkout_id,
            "userId": user_id,
            "locale": locale,
        })))
    }

    pub fn balance(&self, user_id: &str) -> Result<BigDecimal> {
        let response: BalanceResponse =
            decode(self.agent.get(&self.url(&format!("/accounts/{}/balance", user_id))).call())?;
        Ok(response.balance)
    }

    /// Newest first.
    pub fn transactions(&self, user_id: &str, limit: usize) -> Result<Vec<BalanceTransaction>> {
        decode(
            self.agent
                .get(&self.url(&format!("/accounts/{}/transactions", user_id)))
                .query("limit", &limit.to_string())
                .call(),
        )
    }

    pub fn admin_credit(&self, token: &str, body: &Value) -> Result<AdminCreditResponse> {
        decode(
            self.agent
                .post(&self.url("/admin/credit"))
                .set(ADMIN_TOKEN_HEADER, token)
                .send_json(body),
        )
    }

    /// Posts a pre-signed delivery and returns the status and body as-is,
    /// so rejections can be shown rather than treated as failures.
    pub fn send_webhook(&self, headers: &[(&str, &str)], body: &[u8]) -> Result<(u16, Value)> {
        let mut request = self
            .agent
            .post(&self.url("/webhook/polar"))
            .set("content-type", "application/json");
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = match request.send_bytes(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => return Err(anyhow!("Request failed: {}", e)),
        };
        let status = response.status();
        let body = response.into_json().unwrap_or(Value::Null);
        Ok((status, body))
    }
}

fn decode<T: DeserializeOwned>(result: Result<ureq::Response, ureq::Error>) -> Result<T> {
    let response = result.map_err(describe)?;
    response
        .into_json()
        .map_err(|e| anyhow!("Invalid response body: {}", e))
}

/// Surfaces the API's `{"error": ...}` message when there is one.
fn describe(error: ureq::Error) -> anyhow::Error {
    match error {
        ureq::Error::Status(code, response) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "no details".to_string());
            anyhow!("HTTP {}: {}", code, message)
        }
        ureq::Error::Transport(transport) => anyhow!("Request failed: {}", transport),
    }
}
