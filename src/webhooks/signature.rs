use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under the shared secret.
pub fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex-encoded signature. Anything that is
/// not valid hex fails closed.
pub fn verify(secret: &str, payload: &str, signature_hex: &str) -> bool {
    let expected = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    #[test]
    fn recomputed_signature_verifies() {
        let body = r#"{"transaction_ref":"abc","status":"APPROVED"}"#;
        let sig = sign(SECRET, body);
        assert!(verify(SECRET, body, &sig));
    }

    #[test]
    fn tampered_body_with_original_signature_is_rejected() {
        let body = r#"{"transaction_ref":"abc","status":"APPROVED"}"#;
        let sig = sign(SECRET, body);
        let tampered = r#"{"transaction_ref":"abc","status":"DECLINED"}"#;
        assert!(!verify(SECRET, tampered, &sig));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = r#"{"batch_ref":"24137"}"#;
        let sig = sign(SECRET, body);
        assert!(!verify("another-secret", body, &sig));
    }

    #[test]
    fn non_hex_signature_fails_closed() {
        assert!(!verify(SECRET, "{}", "not-hex-at-all"));
        assert!(!verify(SECRET, "{}", ""));
    }
}
