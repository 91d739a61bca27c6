use chrono::Duration;
use std::sync::Arc;

use crate::auth::extractors::ClientContext;
use crate::auth::principal::Principal;
use crate::clock::Clock;
use crate::db::DbPool;
use crate::db::models::login_attempt::NewLoginAttempt;
use crate::db::repositories::login_attempt_repository::LoginAttemptRepository;
use crate::db::repositories::user_repository::UserRepository;
use crate::error::AppError;

const MAX_FAILED_ATTEMPTS: i64 = 5;
const LOCKOUT_WINDOW_MINUTES: i64 = 15;
/// Compared against when there is no usable hash, so every failure costs a bcrypt run.
const DUMMY_PASSWORD: &str = "session-guard-unmatchable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Success(Principal),
    Failed,
    LockedOut,
}

/// External identity check run before a new session is issued.
pub trait CredentialVerifier: Send + Sync {
    fn verify(
        &self,
        identifier: &str,
        secret: &str,
        client: &ClientContext,
    ) -> Result<VerificationOutcome, AppError>;
}

/// Vérifie email + mot de passe contre la table `users` (hash bcrypt).
///
/// Locks an account out after repeated failures inside a sliding window;
/// every attempt is recorded in `login_attempts`.
pub struct PasswordCredentialVerifier {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    dummy_hash: String,
}

impl PasswordCredentialVerifier {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::internal(format!("cannot prepare password check: {e}")))?;
        Ok(Self {
            pool,
            clock,
            dummy_hash,
        })
    }

    fn record_attempt(
        conn: &mut diesel::PgConnection,
        user_id: Option<uuid::Uuid>,
        success: bool,
        now: chrono::DateTime<chrono::Utc>,
        client: &ClientContext,
    ) {
        let attempt = attempt_record(user_id, success, now, client);
        if let Err(e) = LoginAttemptRepository::create(conn, &attempt) {
            tracing::warn!("Failed to record login attempt: {e}");
        }
    }
}

fn attempt_record(
    user_id: Option<uuid::Uuid>,
    success: bool,
    now: chrono::DateTime<chrono::Utc>,
    client: &ClientContext,
) -> NewLoginAttempt<'_> {
    NewLoginAttempt {
        user_id,
        success,
        attempted_at: now,
        user_agent: client.user_agent.as_deref(),
        ip_address: client.ip_address.as_deref(),
    }
}

/// Runs bcrypt whether or not there is a stored hash; a missing one never matches.
fn password_matches(
    secret: &str,
    stored: Option<&str>,
    dummy_hash: &str,
) -> Result<bool, AppError> {
    let matches = bcrypt::verify(secret, stored.unwrap_or(dummy_hash))
        .map_err(|e| AppError::internal(format!("password verification failed: {e}")))?;
    Ok(matches && stored.is_some())
}

impl CredentialVerifier for PasswordCredentialVerifier {
    fn verify(
        &self,
        identifier: &str,
        secret: &str,
        client: &ClientContext,
    ) -> Result<VerificationOutcome, AppError> {
        let mut conn = self.pool.get().map_err(|e| AppError::store(e.to_string()))?;
        let now = self.clock.now();

        let Some(user) = UserRepository::find_by_email(&mut conn, identifier)? else {
            password_matches(secret, None, &self.dummy_hash)?;
            Self::record_attempt(&mut conn, None, false, now, client);
            return Ok(VerificationOutcome::Failed);
        };

        // Protection brute-force: nombre de tentatives récentes
        let failed_count = LoginAttemptRepository::count_failed_attempts(
            &mut conn,
            user.id,
            Duration::minutes(LOCKOUT_WINDOW_MINUTES),
            now,
        )?;
        if failed_count >= MAX_FAILED_ATTEMPTS {
            return Ok(VerificationOutcome::LockedOut);
        }

        let password_hash = user.password_hash.as_deref().filter(|_| user.is_active);
        if !password_matches(secret, password_hash, &self.dummy_hash)? {
            Self::record_attempt(&mut conn, Some(user.id), false, now, client);
            return Ok(VerificationOutcome::Failed);
        }

        Self::record_attempt(&mut conn, Some(user.id), true, now, client);
        UserRepository::update_last_login(&mut conn, user.id, now)?;

        let principal = UserRepository::load_principal(&mut conn, user)?;
        Ok(VerificationOutcome::Success(principal))
    }
}
