//! Polar checkout API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{CheckoutSession, CreatedCheckout, NewCheckout, PaymentProvider, ProviderError};

pub const PRODUCTION_API_URL: &str = "https://api.polar.sh";
pub const SANDBOX_API_URL: &str = "https://sandbox-api.polar.sh";

#[derive(Debug, Serialize)]
struct CreateCheckoutBody<'a> {
    products: Vec<&'a str>,
    success_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    amount: i64,
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct CreateCustomCheckoutBody<'a> {
    product_price_id: &'a str,
    success_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    payment_processor: &'static str,
    amount: i64,
    metadata: Map<String, Value>,
}

/// Polar REST client with bounded request time.
#[derive(Clone)]
pub struct PolarClient {
    client: Client,
    api_url: String,
    access_token: String,
}

impl PolarClient {
    pub fn new(
        api_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("verifynum-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Status URL for one checkout. The id is pushed as a single encoded
    /// path segment, so `/`, `?` and `#` in it cannot leave that segment.
    fn checkout_url(&self, checkout_id: &str) -> Result<Url, ProviderError> {
        if checkout_id.is_empty() || checkout_id == "." || checkout_id == ".." {
            return Err(ProviderError::NotFound(checkout_id.to_string()));
        }
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| ProviderError::NotConfigured(format!("POLAR_API_URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::NotConfigured("POLAR_API_URL has no path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "checkouts"])
            .push(checkout_id);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    async fn send_created(
        &self,
        builder: RequestBuilder,
    ) -> Result<CreatedCheckout, ProviderError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<CreatedCheckout>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for PolarClient {
    async fn create_checkout(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError> {
        let product_id = request
            .product_id
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("POLAR_PRODUCT_ID".to_string()))?;

        let body = CreateCheckoutBody {
            products: vec![product_id],
            success_url: &request.success_url,
            customer_email: request.customer_email.as_deref(),
            amount: request.amount_cents,
            metadata: request.metadata.to_map(),
        };

        tracing::debug!(product_id, amount = request.amount_cents, "Creating Polar checkout");
        self.send_created(self.client.post(self.url("/v1/checkouts/")).json(&body))
            .await
    }

    async fn create_checkout_fallback(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError> {
        let price_id = request
            .price_id
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("POLAR_PRICE_ID".to_string()))?;

        let body = CreateCustomCheckoutBody {
            product_price_id: price_id,
            success_url: &request.success_url,
            customer_email: request.customer_email.as_deref(),
            payment_processor: "stripe",
            amount: request.amount_cents,
            metadata: request.metadata.to_map(),
        };

        tracing::debug!(price_id, "Creating Polar checkout via custom endpoint");
        self.send_created(self.client.post(self.url("/v1/checkouts/custom/")).json(&body))
            .await
    }

    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, ProviderError> {
        let builder = self.client.get(self.checkout_url(checkout_id)?);
        let response = self.authorized(builder).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound(checkout_id.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
            _ => response
                .json::<CheckoutSession>()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = PolarClient::new(
            "https://sandbox-api.polar.sh/",
            "token",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.url("/v1/checkouts/"),
            "https://sandbox-api.polar.sh/v1/checkouts/"
        );
    }

    #[test]
    fn test_checkout_id_stays_inside_its_segment() {
        let client = PolarClient::new(PRODUCTION_API_URL, "token", Duration::from_secs(5)).unwrap();

        let url = client.checkout_url("chk_1").unwrap();
        assert_eq!(url.as_str(), "https://api.polar.sh/v1/checkouts/chk_1");

        let url = client.checkout_url("../orders/ord_9").unwrap();
        assert_eq!(url.path(), "/v1/checkouts/..%2Forders%2Ford_9");
        assert_eq!(url.host_str(), Some("api.polar.sh"));

        let url = client.checkout_url("chk_1?expand=x#frag").unwrap();
        assert!(url.path().starts_with("/v1/checkouts/chk_1%3Fexpand=x%23frag"));
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        for id in ["", ".", ".."] {
            assert!(matches!(
                client.checkout_url(id),
                Err(ProviderError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_checkout_url_keeps_base_path() {
        let client = PolarClient::new(
            "http://localhost:8080/polar/",
            "token",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.checkout_url("chk_1").unwrap().as_str(),
            "http://localhost:8080/polar/v1/checkouts/chk_1"
        );
    }

    #[test]
    fn test_custom_body_shape() {
        let body = CreateCustomCheckoutBody {
            product_price_id: "price_1",
            success_url: "http://localhost:3001/topup/success?checkout_id={CHECKOUT_ID}",
            customer_email: None,
            payment_processor: "stripe",
            amount: 1500,
            metadata: Map::new(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["product_price_id"], "price_1");
        assert_eq!(value["payment_processor"], "stripe");
        assert!(value.get("customer_email").is_none());
    }
}
