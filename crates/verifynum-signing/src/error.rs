// Error type for webhook signature handling

/// Reasons a webhook delivery fails authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing webhook header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid webhook timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Webhook timestamp outside tolerance ({skew_secs}s skew)")]
    TimestampOutOfTolerance { skew_secs: i64 },

    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),

    #[error("No v1 signature present in header")]
    NoSignature,

    #[error("Signature verification failed")]
    Mismatch,
}
