// Webhook delivery headers

use crate::error::SignatureError;

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

/// The three headers that accompany every signed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub id: String,
    pub timestamp: i64,
    /// Raw signature header: space separated `v1,<base64>` entries.
    pub signature: String,
}

impl WebhookHeaders {
    /// Builds headers from optional raw values, typically pulled off an
    /// HTTP request by the caller.
    pub fn from_parts(
        id: Option<&str>,
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<Self, SignatureError> {
        let id = id
            .filter(|v| !v.is_empty())
            .ok_or(SignatureError::MissingHeader(HEADER_ID))?;
        let timestamp = timestamp
            .filter(|v| !v.is_empty())
            .ok_or(SignatureError::MissingHeader(HEADER_TIMESTAMP))?;
        let signature = signature
            .filter(|v| !v.is_empty())
            .ok_or(SignatureError::MissingHeader(HEADER_SIGNATURE))?;

        let timestamp = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            timestamp,
            signature: signature.to_string(),
        })
    }

    /// Iterates over the base64 payloads of all `v1` entries.
    pub fn v1_signatures(&self) -> impl Iterator<Item = &str> {
        self.signature.split_whitespace().filter_map(|entry| {
            let (version, sig) = entry.split_once(',')?;
            (version == "v1").then_some(sig)
        })
    }
}
