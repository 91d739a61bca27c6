use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::keys::SigningKeyProvider;
use crate::auth::principal::Principal;
use crate::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token generation failed: {0}")]
    GenerationFailed(jsonwebtoken::errors::Error),
    #[error("Token verification failed: {0}")]
    VerificationFailed(jsonwebtoken::errors::Error),
    #[error("Access token lifetime {0} overflows the clock")]
    LifetimeOverflow(Duration),
}

/// Registered and private claim names a custom claim may not shadow.
const RESERVED_CLAIMS: &[&str] = &[
    "sub", "email", "iat", "exp", "nbf", "jti", "iss", "aud", "org_id", "name", "roles",
];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, String>,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct AccessTokenSettings {
    pub lifetime: Duration,
    pub issuer: String,
    pub audience: Option<String>,
}

/// Builds and checks the short-lived bearer tokens. Pure computation: never
/// touches storage.
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    kid: String,
    settings: AccessTokenSettings,
    clock: Arc<dyn Clock>,
}

impl AccessTokenIssuer {
    pub fn new(
        keys: &SigningKeyProvider,
        settings: AccessTokenSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: keys.signing_key().encoding_key(),
            decoding_key: keys.validation_key().decoding_key(),
            kid: keys.signing_key().kid().to_string(),
            settings,
            clock,
        }
    }

    /// Génère un access token pour le principal, valable `lifetime` à partir de maintenant
    pub fn issue_access_token(
        &self,
        principal: &Principal,
    ) -> Result<(String, DateTime<Utc>), JwtError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.settings.lifetime)
            .ok_or(JwtError::LifetimeOverflow(self.settings.lifetime))?;

        let custom = principal
            .claims
            .iter()
            .filter(|(name, _)| {
                let reserved = RESERVED_CLAIMS.contains(&name.as_str());
                if reserved {
                    tracing::debug!(claim = %name, "Skipping custom claim that shadows a reserved name");
                }
                !reserved
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let claims = Claims {
            sub: principal.id,
            email: principal.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            org_id: principal.organization().map(str::to_string),
            name: principal.display_name().map(str::to_string),
            roles: principal.roles.clone(),
            custom,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.kid.clone());

        let token =
            encode(&header, &claims, &self.encoding_key).map_err(JwtError::GenerationFailed)?;
        Ok((token, expires_at))
    }

    /// Expiry is judged against the injected clock, without leeway.
    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.validate_exp = false;
        match &self.settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::VerificationFailed)?;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(JwtError::VerificationFailed(
                ErrorKind::ExpiredSignature.into(),
            ));
        }
        Ok(claims)
    }
}
