//! Pairing secrets: 32 random bytes, URL-safe base64 on the wire, SHA-256 hex
//! digest at rest. The secret itself is never stored — only the digest.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a new pairing secret, returning `(secret, digest)`.
///
/// `secret` is what goes in the QR payload / `?token=` query string.
/// `digest` is what the session store persists.
pub fn generate_secret() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::rng(), &mut bytes);
    let secret = URL_SAFE_NO_PAD.encode(bytes);
    let digest = digest_hex(&secret);
    (secret, digest)
}

/// SHA-256 hex digest of a presented secret.
pub fn digest_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of a presented secret against a stored digest.
pub fn verify_digest(secret: &str, digest: &str) -> bool {
    let candidate = digest_hex(secret);
    // Compare as bytes in constant time; digests are both fixed-length hex.
    candidate.as_bytes().ct_eq(digest.as_bytes()).into()
}

/// Generate a 6-digit PIN from a cryptographically uniform source, zero-padded.
pub fn generate_pin() -> String {
    let n: u32 = rand::Rng::random_range(&mut rand::rng(), 0..1_000_000);
    format!("{n:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips() {
        let (secret, digest) = generate_secret();
        assert!(verify_digest(&secret, &digest));
        assert!(!verify_digest("not-the-secret", &digest));
    }

    #[test]
    fn pin_is_six_digits() {
        for _ in 0..100 {
            let pin = generate_pin();
            assert_eq!(pin.len(), 6);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
