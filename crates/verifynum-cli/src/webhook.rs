// Signed test deliveries for exercising the webhook endpoint

use std::str::FromStr;

use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use verifynum_server::models::{find_package, CreditQuote, CUSTOM_PACKAGE_ID};
use verifynum_server::provider::CheckoutMetadata;
use verifynum_signing::{sign_payload, WebhookSecret, HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};

/// A body plus the headers that authenticate it.
#[derive(Debug, Clone)]
pub struct SignedDelivery {
    pub id: String,
    pub timestamp: i64,
    pub signature: String,
    pub body: Vec<u8>,
}

impl SignedDelivery {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_ID, self.id.clone()),
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_SIGNATURE, self.signature.clone()),
        ]
    }
}

/// Picks the quote for a package id or a custom amount (exactly one).
pub fn resolve_quote(package: Option<&str>, amount: Option<&str>) -> Result<(CreditQuote, String)> {
    match (package, amount) {
        (Some(_), Some(_)) => Err(anyhow!("Use either --package or --amount, not both")),
        (None, Some(amount)) => {
            let amount = BigDecimal::from_str(amount.trim())
                .map_err(|_| anyhow!("Invalid amount: '{}'", amount))?;
            if amount <= BigDecimal::from(0) {
                return Err(anyhow!("Amount must be positive"));
            }
            Ok((CreditQuote::for_amount(amount), CUSTOM_PACKAGE_ID.to_string()))
        }
        (package, None) => {
            let id = package.unwrap_or("balance_15");
            let package = find_package(id).ok_or_else(|| anyhow!("Unknown package: '{}'", id))?;
            Ok((package.quote, package.id.to_string()))
        }
    }
}

/// An `order.paid` event as the provider would send it.
pub fn order_paid_event(
    checkout_id: &str,
    user_id: &str,
    quote: &CreditQuote,
    package_id: &str,
) -> Value {
    let metadata = CheckoutMetadata::new(user_id.to_string(), quote, package_id.to_string());
    json!({
        "type": "order.paid",
        "data": {
            "id": format!("ord_{}", uuid::Uuid::new_v4().simple()),
            "checkout_id": checkout_id,
            "status": "paid",
            "metadata": metadata.to_map(),
        }
    })
}

pub fn sign_delivery(
    secret: &WebhookSecret,
    event: &Value,
    timestamp: i64,
) -> Result<SignedDelivery> {
    let body = serde_json::to_vec(event)?;
    let id = format!("msg_{}", uuid::Uuid::new_v4().simple());
    let signature = sign_payload(secret, &id, timestamp, &body)?;
    Ok(SignedDelivery {
        id,
        timestamp,
        signature,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use verifynum_signing::{verify_payload, WebhookHeaders, DEFAULT_TOLERANCE_SECS};

    const SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldC1rZXk=";

    #[test]
    fn test_resolve_quote_defaults_to_balance_15() {
        let (quote, package_id) = resolve_quote(None, None).unwrap();
        assert_eq!(package_id, "balance_15");
        assert_eq!(quote.total_credits, BigDecimal::from_str("16.50").unwrap());
    }

    #[test]
    fn test_resolve_quote_custom_amount() {
        let (quote, package_id) = resolve_quote(None, Some("100")).unwrap();
        assert_eq!(package_id, CUSTOM_PACKAGE_ID);
        assert_eq!(quote.amount, BigDecimal::from(100));
        assert!(quote.total_credits > quote.amount);
    }

    #[test]
    fn test_resolve_quote_rejects_bad_input() {
        assert!(resolve_quote(Some("balance_5"), Some("5")).is_err());
        assert!(resolve_quote(Some("balance_999"), None).is_err());
        assert!(resolve_quote(None, Some("-5")).is_err());
        assert!(resolve_quote(None, Some("five")).is_err());
    }

    #[test]
    fn test_event_metadata_is_consistent() {
        let (quote, package_id) = resolve_quote(Some("balance_30"), None).unwrap();
        let event = order_paid_event("chk_1", "uid_1", &quote, &package_id);
        let metadata = event["data"]["metadata"].as_object().unwrap();
        let parsed = CheckoutMetadata::from_map(metadata).unwrap();
        assert_eq!(parsed.user_id, "uid_1");
        assert_eq!(parsed.total_credits, quote.total_credits);
        assert_eq!(event["data"]["checkout_id"], "chk_1");
    }

    #[test]
    fn test_signed_delivery_verifies() {
        let secret = WebhookSecret::parse(SECRET).unwrap();
        let (quote, package_id) = resolve_quote(None, None).unwrap();
        let event = order_paid_event("chk_1", "uid_1", &quote, &package_id);
        let now = 1_700_000_000;
        let delivery = sign_delivery(&secret, &event, now).unwrap();

        let timestamp = delivery.timestamp.to_string();
        let headers = WebhookHeaders::from_parts(
            Some(delivery.id.as_str()),
            Some(timestamp.as_str()),
            Some(delivery.signature.as_str()),
        )
        .unwrap();
        verify_payload(&secret, &headers, &delivery.body, now, DEFAULT_TOLERANCE_SECS).unwrap();
        assert_eq!(delivery.headers().len(), 3);
    }
}
