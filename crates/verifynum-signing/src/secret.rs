// Webhook secret parsing

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::error::SignatureError;

const SECRET_PREFIX: &str = "whsec_";

/// HMAC key material shared with the checkout provider.
///
/// Secrets carrying the `whsec_` prefix hold base64 key bytes after the
/// prefix. Anything else is used verbatim as UTF-8 bytes.
#[derive(Clone)]
pub struct WebhookSecret {
    key: Vec<u8>,
}

impl WebhookSecret {
    /// Parses a secret as it appears in configuration.
    pub fn parse(raw: &str) -> Result<Self, SignatureError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SignatureError::InvalidSecret("secret is empty".to_string()));
        }

        let key = match raw.strip_prefix(SECRET_PREFIX) {
            Some(encoded) => BASE64_STANDARD
                .decode(encoded)
                .map_err(|e| SignatureError::InvalidSecret(format!("bad base64: {}", e)))?,
            None => raw.as_bytes().to_vec(),
        };

        if key.is_empty() {
            return Err(SignatureError::InvalidSecret("key material is empty".to_string()));
        }

        Ok(Self { key })
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("key_len", &self.key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_secret_is_base64_decoded() {
        let secret = WebhookSecret::parse("whsec_aGVsbG8=").unwrap();
        assert_eq!(secret.key(), b"hello");
    }

    #[test]
    fn test_plain_secret_is_used_verbatim() {
        let secret = WebhookSecret::parse("polar_whs_plain").unwrap();
        assert_eq!(secret.key(), b"polar_whs_plain");
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(WebhookSecret::parse("   ").is_err());
        assert!(WebhookSecret::parse("whsec_").is_err());
    }

    #[test]
    fn test_bad_base64_rejected() {
        let err = WebhookSecret::parse("whsec_***").unwrap_err();
        assert!(err.to_string().contains("bad base64"));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let secret = WebhookSecret::parse("super-secret-value").unwrap();
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("super-secret-value"));
    }
}
