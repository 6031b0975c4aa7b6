//! API key generation and hashing utilities
//!
//! Keys are hashed with HMAC-SHA256 under a server pepper so a leaked
//! database alone cannot be used to verify candidate keys.

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::core::constants::{
    PUBLIC_KEY_PREFIX, SECRET_KEY_DISPLAY_LEN, SECRET_KEY_PREFIX, SECRET_KEY_RANDOM_LENGTH,
};

type HmacSha256 = Hmac<Sha256>;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_suffix(len: usize) -> String {
    (0..len)
        .map(|_| CHARSET[OsRng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate a public key: `pk-lt-{random}`
pub fn generate_public_key() -> String {
    format!("{}{}", PUBLIC_KEY_PREFIX, random_suffix(SECRET_KEY_RANDOM_LENGTH))
}

/// Generate a secret key: `sk-lt-{random}`
pub fn generate_secret_key() -> String {
    format!("{}{}", SECRET_KEY_PREFIX, random_suffix(SECRET_KEY_RANDOM_LENGTH))
}

/// HMAC-SHA256 hash of a secret key with the server pepper (hex encoded)
pub fn hash_secret_key(key: &str, pepper: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(pepper).expect("HMAC accepts any key length");
    mac.update(key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Display form stored alongside the hash: first chars + ellipsis + last 4
pub fn display_secret_key(key: &str) -> String {
    if key.len() <= SECRET_KEY_DISPLAY_LEN + 4 {
        return key.to_string();
    }
    let head: String = key.chars().take(SECRET_KEY_DISPLAY_LEN).collect();
    let tail: String = key
        .chars()
        .skip(key.chars().count().saturating_sub(4))
        .collect();
    format!("{}...{}", head, tail)
}

/// Validate secret key format: `sk-lt-{lowercase alphanumeric}`
pub fn is_valid_secret_key(key: &str) -> bool {
    key.starts_with(SECRET_KEY_PREFIX)
        && key.len() == SECRET_KEY_PREFIX.len() + SECRET_KEY_RANDOM_LENGTH
        && key[SECRET_KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Extract a (public, secret) credential pair from an Authorization header.
///
/// `Basic` carries `public:secret` base64-encoded; `Bearer` carries the
/// secret alone (public side resolved from storage by hash).
pub fn extract_credentials(header: &str) -> Option<(Option<String>, String)> {
    if let Some(encoded) = header.strip_prefix("Basic ") {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())?;
        let (public, secret) = decoded.split_once(':')?;
        if secret.is_empty() {
            return None;
        }
        let public = (!public.is_empty()).then(|| public.to_string());
        Some((public, secret.to_string()))
    } else {
        header
            .strip_prefix("Bearer ")
            .map(|key| (None, key.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_valid_and_unique() {
        let a = generate_secret_key();
        let b = generate_secret_key();
        assert!(is_valid_secret_key(&a));
        assert!(is_valid_secret_key(&b));
        assert_ne!(a, b);
        assert!(generate_public_key().starts_with(PUBLIC_KEY_PREFIX));
    }

    #[test]
    fn hash_is_deterministic_and_pepper_sensitive() {
        let key = generate_secret_key();
        let h1 = hash_secret_key(&key, b"pepper-a");
        let h2 = hash_secret_key(&key, b"pepper-a");
        let h3 = hash_secret_key(&key, b"pepper-b");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn display_form_hides_the_middle() {
        let key = "sk-lt-a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6q7r8s9t0u1v2w3x4y5";
        let display = display_secret_key(key);
        assert!(display.starts_with("sk-lt-"));
        assert!(display.contains("..."));
        assert!(display.ends_with("x4y5"));
        assert!(display.len() < key.len());
    }

    #[test]
    fn extract_basic_credentials() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode("pk-lt-pub:sk-lt-sec");
        let (public, secret) = extract_credentials(&format!("Basic {}", encoded)).unwrap();
        assert_eq!(public.as_deref(), Some("pk-lt-pub"));
        assert_eq!(secret, "sk-lt-sec");
    }

    #[test]
    fn extract_bearer_secret() {
        let (public, secret) = extract_credentials("Bearer sk-lt-abc").unwrap();
        assert_eq!(public, None);
        assert_eq!(secret, "sk-lt-abc");
    }

    #[test]
    fn extract_rejects_malformed_headers() {
        assert!(extract_credentials("Digest abc").is_none());
        assert!(extract_credentials("").is_none());
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode("pk-only:");
        assert!(extract_credentials(&format!("Basic {}", encoded)).is_none());
    }
}
