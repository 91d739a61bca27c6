//! Shared wiring for unit tests: in-memory store, manual clock, fixed key.

use chrono::Duration;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::auth::credentials::{CredentialVerifier, VerificationOutcome};
use crate::auth::extractors::ClientContext;
use crate::auth::jwt::{AccessTokenIssuer, AccessTokenSettings};
use crate::auth::keys::{SigningKey, SigningKeyProvider};
use crate::auth::logout::SessionTerminator;
use crate::auth::principal::Principal;
use crate::auth::rotation::{RefreshLifetimes, TokenRotationEngine};
use crate::clock::{Clock, ManualClock};
use crate::db::memory::InMemoryStore;
use crate::error::AppError;

pub const TEST_SECRET: &str = "Correct-Horse-9";
pub const LOCKED_EMAIL: &str = "locked@example.com";

/// Accepts exactly one principal/secret pair and reports `LOCKED_EMAIL` as locked.
pub struct StaticVerifier {
    principal: Principal,
    last_client: Mutex<Option<ClientContext>>,
}

impl StaticVerifier {
    pub fn last_client(&self) -> Option<ClientContext> {
        self.last_client
            .lock()
            .expect("verifier mutex should not be poisoned")
            .clone()
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify(
        &self,
        identifier: &str,
        secret: &str,
        client: &ClientContext,
    ) -> Result<VerificationOutcome, AppError> {
        *self
            .last_client
            .lock()
            .expect("verifier mutex should not be poisoned") = Some(client.clone());
        if identifier == LOCKED_EMAIL {
            return Ok(VerificationOutcome::LockedOut);
        }
        if identifier == self.principal.email && secret == TEST_SECRET {
            return Ok(VerificationOutcome::Success(self.principal.clone()));
        }
        Ok(VerificationOutcome::Failed)
    }
}

pub fn test_issuer(clock: Arc<dyn Clock>) -> AccessTokenIssuer {
    let keys = SigningKeyProvider::from_key(
        SigningKey::from_bytes(vec![42; 32], "test key").expect("key"),
    );
    AccessTokenIssuer::new(
        &keys,
        AccessTokenSettings {
            lifetime: Duration::minutes(15),
            issuer: "session-guard-tests".to_string(),
            audience: None,
        },
        clock,
    )
}

pub struct Fixture {
    pub engine: TokenRotationEngine,
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub issuer: AccessTokenIssuer,
    pub principal: Principal,
    pub verifier: Arc<StaticVerifier>,
}

impl Fixture {
    pub fn new(token_lifetime: Duration, family_lifetime: Duration) -> Self {
        let store = InMemoryStore::new();
        let clock = Arc::new(ManualClock::default());

        let mut principal = Principal::new(Uuid::new_v4(), "alice@example.com");
        principal.roles = vec!["member".to_string()];
        store.add_principal(principal.clone());

        let issuer = test_issuer(clock.clone());
        let verifier = Arc::new(StaticVerifier {
            principal: principal.clone(),
            last_client: Mutex::new(None),
        });
        let engine = TokenRotationEngine::new(
            Arc::new(store.clone()),
            issuer.clone(),
            verifier.clone(),
            clock.clone(),
            RefreshLifetimes {
                token: token_lifetime,
                family: family_lifetime,
            },
        );

        Self {
            engine,
            store,
            clock,
            issuer,
            principal,
            verifier,
        }
    }

    pub fn terminator(&self) -> SessionTerminator {
        SessionTerminator::new(Arc::new(self.store.clone()), self.clock.clone())
    }
}
