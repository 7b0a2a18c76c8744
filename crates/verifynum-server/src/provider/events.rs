//! Typed provider webhook events.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::CheckoutStatus;

pub const CHECKOUT_CREATED: &str = "checkout.created";
pub const CHECKOUT_UPDATED: &str = "checkout.updated";
pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_PAID: &str = "order.paid";
pub const SUBSCRIPTION_CREATED: &str = "subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "subscription.updated";
pub const SUBSCRIPTION_CANCELED: &str = "subscription.canceled";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutEventData {
    pub id: String,
    #[serde(default)]
    pub status: Option<CheckoutStatus>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderData {
    pub id: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl OrderData {
    /// Idempotency key for the credit: the originating checkout, or the
    /// order itself when the provider did not link one.
    pub fn idempotency_key(&self) -> &str {
        self.checkout_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

/// Closed set of events the reconciler understands. Anything else is
/// carried as `Unknown` and acknowledged without effect.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    CheckoutCreated(CheckoutEventData),
    CheckoutUpdated(CheckoutEventData),
    OrderCreated(OrderData),
    OrderPaid(OrderData),
    SubscriptionCreated(ResourceRef),
    SubscriptionUpdated(ResourceRef),
    SubscriptionCanceled(ResourceRef),
    Unknown(String),
}

impl WebhookEvent {
    /// Parses a raw delivery body. Known event types whose payload does not
    /// fit are errors.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let Envelope { event_type, data } = serde_json::from_slice(body)?;
        let event = match event_type.as_str() {
            CHECKOUT_CREATED => WebhookEvent::CheckoutCreated(serde_json::from_value(data)?),
            CHECKOUT_UPDATED => WebhookEvent::CheckoutUpdated(serde_json::from_value(data)?),
            ORDER_CREATED => WebhookEvent::OrderCreated(serde_json::from_value(data)?),
            ORDER_PAID => WebhookEvent::OrderPaid(serde_json::from_value(data)?),
            SUBSCRIPTION_CREATED => {
                WebhookEvent::SubscriptionCreated(serde_json::from_value(data)?)
            }
            SUBSCRIPTION_UPDATED => {
                WebhookEvent::SubscriptionUpdated(serde_json::from_value(data)?)
            }
            SUBSCRIPTION_CANCELED => {
                WebhookEvent::SubscriptionCanceled(serde_json::from_value(data)?)
            }
            _ => WebhookEvent::Unknown(event_type),
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCreated(_) => CHECKOUT_CREATED,
            WebhookEvent::CheckoutUpdated(_) => CHECKOUT_UPDATED,
            WebhookEvent::OrderCreated(_) => ORDER_CREATED,
            WebhookEvent::OrderPaid(_) => ORDER_PAID,
            WebhookEvent::SubscriptionCreated(_) => SUBSCRIPTION_CREATED,
            WebhookEvent::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            WebhookEvent::SubscriptionCanceled(_) => SUBSCRIPTION_CANCELED,
            WebhookEvent::Unknown(event_type) => event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WebhookEvent {
        WebhookEvent::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_order_paid_parses() {
        let event = parse(json!({
            "type": "order.paid",
            "data": {
                "id": "ord_1",
                "checkout_id": "chk_1",
                "metadata": {"userId": "uid_1", "totalCredits": "16.50"}
            }
        }));
        let WebhookEvent::OrderPaid(order) = event else {
            panic!("expected order.paid");
        };
        assert_eq!(order.idempotency_key(), "chk_1");
        assert_eq!(order.metadata["userId"], json!("uid_1"));
    }

    #[test]
    fn test_order_key_falls_back_to_order_id() {
        let event = parse(json!({"type": "order.paid", "data": {"id": "ord_1"}}));
        let WebhookEvent::OrderPaid(order) = event else {
            panic!("expected order.paid");
        };
        assert_eq!(order.idempotency_key(), "ord_1");

        let event = parse(json!({
            "type": "order.paid",
            "data": {"id": "ord_2", "checkout_id": ""}
        }));
        let WebhookEvent::OrderPaid(order) = event else {
            panic!("expected order.paid");
        };
        assert_eq!(order.idempotency_key(), "ord_2");
    }

    #[test]
    fn test_unknown_type_is_carried() {
        let event = parse(json!({"type": "benefit.granted", "data": {"id": "x"}}));
        assert_eq!(event, WebhookEvent::Unknown("benefit.granted".to_string()));
        assert_eq!(event.event_type(), "benefit.granted");
    }

    #[test]
    fn test_checkout_updated_status() {
        let event = parse(json!({
            "type": "checkout.updated",
            "data": {"id": "chk_1", "status": "confirmed"}
        }));
        assert_eq!(
            event,
            WebhookEvent::CheckoutUpdated(CheckoutEventData {
                id: "chk_1".to_string(),
                status: Some(CheckoutStatus::Confirmed),
            })
        );
    }

    #[test]
    fn test_known_type_with_bad_payload_is_error() {
        let body = json!({"type": "order.paid", "data": {"metadata": {}}}).to_string();
        assert!(WebhookEvent::parse(body.as_bytes()).is_err());
        assert!(WebhookEvent::parse(b"not json").is_err());
    }
}
