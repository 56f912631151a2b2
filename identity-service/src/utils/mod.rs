pub mod password;
pub mod validation;

pub use password::{Password, PasswordHashString, PasswordHasher, PasswordPolicy};
pub use validation::ValidatedJson;

use rand::Rng;
use sha2::{Digest, Sha256};

/// 32 random bytes, hex encoded.
pub fn generate_opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// SHA-256 hex digest of an opaque token. Only digests are persisted.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
