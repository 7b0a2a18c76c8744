// Webhook signing and verification
//
// Signed content is "{id}.{timestamp}.{body}", authenticated with
// HMAC-SHA256 and carried base64-encoded in `v1,` entries.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;
use crate::headers::WebhookHeaders;
use crate::secret::WebhookSecret;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted between the provider and us.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

fn mac_for(
    secret: &WebhookSecret,
    id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<HmacSha256, SignatureError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.key())
        .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Produces a `v1,<base64>` signature header value for a payload.
pub fn sign_payload(
    secret: &WebhookSecret,
    id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<String, SignatureError> {
    let tag = mac_for(secret, id, timestamp, body)?.finalize().into_bytes();
    Ok(format!("v1,{}", BASE64_STANDARD.encode(tag)))
}

/// Verifies a delivery against the shared secret.
///
/// # Arguments
/// * `secret` - shared webhook secret
/// * `headers` - id, timestamp and signature headers of the delivery
/// * `body` - the raw request body, exactly as received
/// * `now` - current unix time in seconds
/// * `tolerance_secs` - accepted skew between `now` and the header timestamp
///
/// Succeeds if any `v1` entry matches. Comparison is constant-time.
pub fn verify_payload(
    secret: &WebhookSecret,
    headers: &WebhookHeaders,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let skew = (now - headers.timestamp).abs();
    if skew > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance { skew_secs: skew });
    }

    let mut saw_signature = false;
    for candidate in headers.v1_signatures() {
        saw_signature = true;
        let Ok(candidate) = BASE64_STANDARD.decode(candidate) else {
            continue;
        };
        let mac = mac_for(secret, &headers.id, headers.timestamp, body)?;
        if mac.verify_slice(&candidate).is_ok() {
            return Ok(());
        }
    }

    if saw_signature {
        Err(SignatureError::Mismatch)
    } else {
        Err(SignatureError::NoSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn secret() -> WebhookSecret {
        WebhookSecret::parse("whsec_c2VjcmV0LWtleS1mb3ItdGVzdHM=").unwrap()
    }

    fn signed_headers(body: &[u8]) -> WebhookHeaders {
        WebhookHeaders {
            id: "msg_test".to_string(),
            timestamp: NOW,
            signature: sign_payload(&secret(), "msg_test", NOW, body).unwrap(),
        }
    }

    #[test]
    fn test_sign_then_verify_succeeds() {
        let body = br#"{"type":"order.paid"}"#;
        let headers = signed_headers(body);
        assert!(headers.signature.starts_with("v1,"));
        assert!(verify_payload(&secret(), &headers, body, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_verify_fails_on_tampered_body() {
        let headers = signed_headers(br#"{"amount":"15"}"#);
        let result = verify_payload(
            &secret(),
            &headers,
            br#"{"amount":"1500"}"#,
            NOW,
            DEFAULT_TOLERANCE_SECS,
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_verify_fails_with_other_secret() {
        let body = b"{}";
        let headers = signed_headers(body);
        let other = WebhookSecret::parse("another-secret").unwrap();
        assert_eq!(
            verify_payload(&other, &headers, body, NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let body = b"{}";
        let headers = signed_headers(body);
        let result = verify_payload(&secret(), &headers, body, NOW + 301, DEFAULT_TOLERANCE_SECS);
        assert_eq!(
            result,
            Err(SignatureError::TimestampOutOfTolerance { skew_secs: 301 })
        );
    }

    #[test]
    fn test_verify_accepts_any_matching_entry() {
        let body = b"{}";
        let mut headers = signed_headers(body);
        headers.signature = format!("v1,bm90LXRoZS1zaWc= {}", headers.signature);
        assert!(verify_payload(&secret(), &headers, body, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_verify_without_v1_entry() {
        let body = b"{}";
        let mut headers = signed_headers(body);
        headers.signature = "v2,abcdef".to_string();
        assert_eq!(
            verify_payload(&secret(), &headers, body, NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::NoSignature)
        );
    }

    #[test]
    fn test_verify_skips_undecodable_entries() {
        let body = b"{}";
        let mut headers = signed_headers(body);
        headers.signature = "v1,!!!not-base64!!!".to_string();
        assert_eq!(
            verify_payload(&secret(), &headers, body, NOW, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }
}
