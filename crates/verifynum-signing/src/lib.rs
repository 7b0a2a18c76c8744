// VerifyNum Signing - webhook signature primitives for the checkout provider

pub mod error;
pub mod headers;
pub mod secret;
pub mod webhook;

pub use error::SignatureError;
pub use headers::{WebhookHeaders, HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
pub use secret::WebhookSecret;
pub use webhook::{sign_payload, verify_payload, DEFAULT_TOLERANCE_SECS};
