use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::Environment;

/// Minimum symmetric key size for HS256.
pub const MIN_KEY_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("{source_name} is not valid base64: {reason}")]
    InvalidBase64 {
        source_name: &'static str,
        reason: String,
    },
    #[error("{source_name} decodes to {bits} bits, at least {} required", MIN_KEY_BYTES * 8)]
    TooShort { source_name: &'static str, bits: usize },
    #[error("no signing key configured; set AUTH_SIGNING_KEY or AUTH_SIGNING_KEY_FILE")]
    Missing,
    #[error("failed to generate ephemeral signing key: {0}")]
    Generation(String),
}

/// Raw key material, as found in the environment or configuration.
#[derive(Default, Clone)]
pub struct KeySources {
    pub environment_secret: Option<String>,
    pub configured_secret: Option<String>,
}

impl std::fmt::Debug for KeySources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySources")
            .field("environment_secret", &self.environment_secret.as_ref().map(|_| "***"))
            .field("configured_secret", &self.configured_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Symmetric HMAC key plus a short identifier derived from it.
#[derive(Clone)]
pub struct SigningKey {
    bytes: Vec<u8>,
    kid: String,
}

impl SigningKey {
    pub fn from_bytes(bytes: Vec<u8>, source_name: &'static str) -> Result<Self, KeyError> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(KeyError::TooShort {
                source_name,
                bits: bytes.len() * 8,
            });
        }

        let digest = Sha256::digest(&bytes);
        let kid = hex::encode(&digest[..8]);
        Ok(Self { bytes, kid })
    }

    pub fn from_base64(encoded: &str, source_name: &'static str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidBase64 {
                source_name,
                reason: e.to_string(),
            })?;
        Self::from_bytes(bytes, source_name)
    }

    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = vec![0u8; MIN_KEY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Self::from_bytes(bytes, "ephemeral key")
    }

    /// Hash-prefix identifier carried in the token header as `kid`.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.bytes)
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.bytes)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// Resolves the process signing key once at startup.
///
/// Signing and validation currently share one symmetric key; the accessors are
/// split so an asymmetric pair can replace it without touching callers.
#[derive(Debug, Clone)]
pub struct SigningKeyProvider {
    key: SigningKey,
}

impl SigningKeyProvider {
    /// Environment secret, then configured secret, then (outside production) an ephemeral key.
    pub fn resolve(sources: &KeySources, environment: &Environment) -> Result<Self, KeyError> {
        if let Some(secret) = non_blank(sources.environment_secret.as_deref()) {
            let key = SigningKey::from_base64(secret, "AUTH_SIGNING_KEY")?;
            tracing::info!(kid = key.kid(), "Signing key loaded from environment");
            return Ok(Self { key });
        }

        if let Some(secret) = non_blank(sources.configured_secret.as_deref()) {
            let key = SigningKey::from_base64(secret, "configured signing key")?;
            tracing::info!(kid = key.kid(), "Signing key loaded from configuration");
            return Ok(Self { key });
        }

        if environment.is_production() {
            tracing::error!("❌ No signing key configured in production!");
            return Err(KeyError::Missing);
        }

        let key = SigningKey::generate()?;
        tracing::warn!(
            kid = key.kid(),
            "⚠️  No signing key configured, using an ephemeral key (DEVELOPMENT ONLY!)"
        );
        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn from_key(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn validation_key(&self) -> &SigningKey {
        &self.key
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
