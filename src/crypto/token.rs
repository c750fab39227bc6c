use sha2::{Digest, Sha256};

/// Digests a bearer token for storage and lookups.
///
/// # Returns
///
/// The lowercase hex SHA-256 of the token (64 characters).
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
