use rand::Rng;
use sha2::{Digest, Sha256};

/// 32 random bytes, hex-encoded. Safe to drop into a URL as-is.
pub fn generate_verification_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Storage key for a raw verification token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
