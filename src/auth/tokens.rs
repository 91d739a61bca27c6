use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Entropy of a refresh secret, in bytes.
const REFRESH_SECRET_BYTES: usize = 32;

/// Create a new refresh secret.
///
/// The raw value is only handed to the client; the store keeps its hash.
pub fn generate_refresh_secret() -> Result<String, AppError> {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AppError::token_generation_failed(format!("refresh secret: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Lowercase hex SHA-256 of the raw secret, as stored in `token_hash`.
pub fn hash_refresh_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
