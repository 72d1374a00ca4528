//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Check `header` against HMAC-SHA256 of the exact raw `body`.
///
/// Rejects a missing header, a missing `sha256=` prefix, and non-hex
/// digests. The digest comparison is constant-time.
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    let Some(hex_digest) = header.and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produce a header value for `body` (used by tests and local tooling).
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let digest = match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    };
    format!("{SIGNATURE_PREFIX}{digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"app-secret";

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"object":"instagram"}"#;
        let header = sign(body, SECRET);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature(body, Some(&header), SECRET));
    }

    #[test]
    fn tampered_body_fails() {
        let header = sign(b"original", SECRET);
        assert!(!verify_signature(b"0riginal", Some(&header), SECRET));
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign(b"body", b"other-secret");
        assert!(!verify_signature(b"body", Some(&header), SECRET));
    }

    #[test]
    fn malformed_headers_fail() {
        let digest = sign(b"body", SECRET);
        let bare = digest.trim_start_matches("sha256=");
        assert!(!verify_signature(b"body", None, SECRET));
        assert!(!verify_signature(b"body", Some(bare), SECRET));
        assert!(!verify_signature(b"body", Some(&format!("sha1={bare}")), SECRET));
        assert!(!verify_signature(b"body", Some("sha256=zz-not-hex"), SECRET));
        assert!(!verify_signature(b"body", Some("sha256="), SECRET));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let header = "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";
        assert!(verify_signature(
            b"The quick brown fox jumps over the lazy dog",
            Some(header),
            b"key"
        ));
    }
}
