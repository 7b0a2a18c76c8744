// Reference vector published with the Standard Webhooks scheme.
//
// If this fails, deliveries signed by the provider will not verify.

use verifynum_signing::{sign_payload, verify_payload, WebhookHeaders, WebhookSecret};

const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
const MSG_ID: &str = "msg_p5jXN8AQM9LWM0D4loKWxJek";
const TIMESTAMP: i64 = 1614265330;
const PAYLOAD: &str = r#"{"test": 2432232314}"#;
const EXPECTED: &str = "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=";

#[test]
fn test_reference_signature() {
    let secret = WebhookSecret::parse(SECRET).expect("valid secret");
    let signature = sign_payload(&secret, MSG_ID, TIMESTAMP, PAYLOAD.as_bytes())
        .expect("signing succeeds");
    assert_eq!(signature, EXPECTED);
}

#[test]
fn test_reference_delivery_verifies() {
    let secret = WebhookSecret::parse(SECRET).expect("valid secret");
    let timestamp = TIMESTAMP.to_string();
    let headers = WebhookHeaders::from_parts(Some(MSG_ID), Some(&timestamp), Some(EXPECTED))
        .expect("headers parse");

    verify_payload(&secret, &headers, PAYLOAD.as_bytes(), TIMESTAMP + 10, 300)
        .expect("reference delivery should verify");
}
