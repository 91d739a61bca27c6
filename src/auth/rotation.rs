//! Issues sessions and rotates refresh tokens within their family.
//!
//! A refresh token is `Active` until it is either `Replaced` (consumed by a
//! successful rotation) or `Revoked` (logout, theft response). Both are
//! terminal. Presenting a replaced token again revokes the whole family.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::audit::AuditLog;
use crate::auth::credentials::{CredentialVerifier, VerificationOutcome};
use crate::auth::extractors::ClientContext;
use crate::auth::jwt::AccessTokenIssuer;
use crate::auth::principal::Principal;
use crate::auth::tokens::{generate_refresh_secret, hash_refresh_token};
use crate::clock::Clock;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::NewRefreshToken;
use crate::db::store::{
    RefreshTokenStore, StoreProvider, StoreSession, StoredRefreshToken, TransactionCoordinator,
};
use crate::error::{AppError, UnauthorizedReason};

/// Attempts at revoking a family after reuse was detected.
const REVOCATION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct RefreshLifetimes {
    /// Sliding lifetime of a single refresh token.
    pub token: Duration,
    /// Absolute ceiling of a family, fixed when the family is created.
    pub family: Duration,
}

/// Returned once per issuance; the raw refresh secret is never stored.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// The lineage a newly minted refresh token joins.
#[derive(Debug, Clone, Copy)]
struct Lineage {
    family_id: Uuid,
    family_expires_at: DateTime<Utc>,
}

struct Minted {
    pair: TokenPair,
    token_hash: String,
}

pub struct TokenRotationEngine {
    store: Arc<dyn StoreProvider>,
    issuer: AccessTokenIssuer,
    verifier: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn Clock>,
    lifetimes: RefreshLifetimes,
    audit: AuditLog,
}

impl TokenRotationEngine {
    pub fn new(
        store: Arc<dyn StoreProvider>,
        issuer: AccessTokenIssuer,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
        lifetimes: RefreshLifetimes,
    ) -> Self {
        Self {
            store,
            issuer,
            verifier,
            clock,
            lifetimes,
            audit: AuditLog,
        }
    }

    /// Checks credentials, then starts a new family. Failure and lockout are
    /// indistinguishable to the caller.
    pub fn login(
        &self,
        identifier: &str,
        secret: &str,
        client: &ClientContext,
    ) -> Result<TokenPair, AppError> {
        match self.verifier.verify(identifier, secret, client)? {
            VerificationOutcome::Success(principal) => self.issue_new_session(&principal, client),
            VerificationOutcome::Failed => {
                self.audit.login_failed(false);
                Err(AppError::unauthorized(UnauthorizedReason::InvalidCredentials))
            }
            VerificationOutcome::LockedOut => {
                self.audit.login_failed(true);
                Err(AppError::unauthorized(UnauthorizedReason::InvalidCredentials))
            }
        }
    }

    /// Starts a new family for `principal` (login, invitation acceptance).
    pub fn issue_new_session(
        &self,
        principal: &Principal,
        client: &ClientContext,
    ) -> Result<TokenPair, AppError> {
        let now = self.clock.now();
        let lineage = Lineage {
            family_id: Uuid::new_v4(),
            family_expires_at: expiry_after(now, self.lifetimes.family, "refresh family")?,
        };

        let mut session = self.store.open()?;
        session.begin()?;
        let minted = match self.mint(session.as_mut(), principal, lineage, client, now) {
            Ok(minted) => minted,
            Err(e) => {
                rollback_quietly(session.as_mut());
                return Err(e);
            }
        };
        session.commit()?;

        self.audit
            .session_issued(principal.id, lineage.family_id, client.ip_address.as_deref());
        Ok(minted.pair)
    }

    /// Consumes `raw_refresh_token` and returns its successor pair.
    ///
    /// Never retries: losing the conditional update to a concurrent request
    /// is reported as `TokenAlreadyUsed`.
    pub fn rotate(
        &self,
        raw_refresh_token: &str,
        client: &ClientContext,
    ) -> Result<TokenPair, AppError> {
        let hash = hash_refresh_token(raw_refresh_token);
        let now = self.clock.now();
        let mut session = self.store.open()?;

        let Some(stored) = session.find_by_hash(&hash)? else {
            return Err(self.reject(UnauthorizedReason::InvalidRefreshToken, None));
        };
        let family_id = stored.token.family_id;

        if stored.token.is_replaced() {
            let revoked = self.revoke_family(session.as_mut(), family_id, now)?;
            self.audit
                .reuse_detected(stored.principal.id, family_id, revoked);
            return Err(self.reject(UnauthorizedReason::ReuseDetected, Some(family_id)));
        }

        if !stored.token.is_active(now) {
            return Err(self.reject(UnauthorizedReason::ExpiredOrRevoked, Some(family_id)));
        }

        session.begin()?;
        let minted = match self.rotate_within(session.as_mut(), &stored, client, now) {
            Ok(minted) => minted,
            Err(e) => {
                rollback_quietly(session.as_mut());
                if let Some(reason) = e.unauthorized_reason() {
                    self.audit.rotation_rejected(reason, Some(family_id));
                }
                return Err(e);
            }
        };
        // Past the conditional update: finish regardless of the caller
        session.commit()?;

        self.audit
            .token_rotated(stored.principal.id, family_id, stored.token.id);
        tracing::debug!(
            family_id = %family_id,
            refresh_expires_at = %minted.pair.refresh_expires_at,
            "Refresh token rotated"
        );
        Ok(minted.pair)
    }

    fn rotate_within(
        &self,
        session: &mut dyn StoreSession,
        stored: &StoredRefreshToken,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> Result<Minted, AppError> {
        // The ceiling is inherited, never extended
        let mut family_expires_at = stored.token.family_expires_at;
        if let Some(latest) = session.find_latest_active_by_family(stored.token.family_id)? {
            family_expires_at = family_expires_at.min(latest.family_expires_at);
        }

        let lineage = Lineage {
            family_id: stored.token.family_id,
            family_expires_at,
        };
        let minted = self.mint(session, &stored.principal, lineage, client, now)?;

        let affected = session.mark_replaced(stored.token.id, &minted.token_hash, now)?;
        if affected == 0 {
            return Err(AppError::unauthorized(UnauthorizedReason::TokenAlreadyUsed));
        }

        Ok(minted)
    }

    /// Generates a pair for `principal` in `lineage` and stages its refresh row.
    fn mint(
        &self,
        session: &mut dyn StoreSession,
        principal: &Principal,
        lineage: Lineage,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> Result<Minted, AppError> {
        let refresh_token = generate_refresh_secret()?;
        let token_hash = hash_refresh_token(&refresh_token);
        let refresh_expires_at = expiry_after(now, self.lifetimes.token, "refresh token")?
            .min(lineage.family_expires_at);

        let (access_token, access_expires_at) = self.issuer.issue_access_token(principal)?;

        session.insert(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: principal.id,
            token_hash: token_hash.clone(),
            family_id: lineage.family_id,
            expires_at: refresh_expires_at,
            family_expires_at: lineage.family_expires_at,
            created_at: now,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_address.clone(),
        })?;

        Ok(Minted {
            pair: TokenPair {
                access_token,
                access_expires_at,
                refresh_token,
                refresh_expires_at,
            },
            token_hash,
        })
    }

    /// Family revocation after reuse must land even though the caller gets an error.
    fn revoke_family(
        &self,
        session: &mut dyn StoreSession,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut last_error: Option<RepositoryError> = None;
        for attempt in 1..=REVOCATION_ATTEMPTS {
            match session.mark_family_revoked(family_id, now) {
                Ok(count) => return Ok(count),
                Err(e) => {
                    tracing::warn!(
                        family_id = %family_id,
                        attempt,
                        "Family revocation failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        let err = last_error.map_or_else(
            || AppError::store("family revocation failed"),
            AppError::from,
        );
        self.audit.store_failure("mark_family_revoked", &err.to_string());
        Err(err)
    }

    fn reject(&self, reason: UnauthorizedReason, family_id: Option<Uuid>) -> AppError {
        self.audit.rotation_rejected(reason, family_id);
        AppError::unauthorized(reason)
    }
}

fn expiry_after(
    now: DateTime<Utc>,
    lifetime: Duration,
    what: &str,
) -> Result<DateTime<Utc>, AppError> {
    now.checked_add_signed(lifetime).ok_or_else(|| {
        AppError::Configuration(format!("{what} lifetime {lifetime} overflows the clock"))
    })
}

fn rollback_quietly(session: &mut dyn StoreSession) {
    if let Err(e) = session.rollback() {
        tracing::warn!("Rollback failed: {e}");
    }
}
