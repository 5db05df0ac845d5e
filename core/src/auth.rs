use rand::Rng;
use sha2::{Digest, Sha256};

/// Random bytes behind a confirmation token. 8 bytes keeps the hex form at
/// 16 chars, which fits a callback payload next to its domain and verb.
pub const CONFIRMATION_TOKEN_BYTES: usize = 8;

/// Generate a confirmation token: `CONFIRMATION_TOKEN_BYTES` random bytes hex-encoded.
/// Hex never contains the callback separator.
pub fn generate_confirmation_token() -> String {
    random_hex(CONFIRMATION_TOKEN_BYTES)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented secret with the configured one by digest, so the
/// comparison time does not depend on the length of the shared prefix.
pub fn secret_matches(presented: &str, expected: &str) -> bool {
    let presented = hash_token(presented);
    let expected = hash_token(expected);
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Generate `n` random bytes and return as hex string.
fn random_hex(n: usize) -> String {
    let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    hex::encode(&bytes)
}
