//! In-process store used by the engine and router tests.
//!
//! Mirrors the Postgres behaviour the engine depends on: staged inserts are
//! invisible to other sessions until commit, and a conditional replace holds
//! the row until its transaction ends. A competing `mark_replaced` on a held
//! row reports 0 immediately where Postgres would block and then report 0.
//! A family revocation that meets a held row lands when the holder ends:
//! on commit it also takes the holder's staged successor, on rollback the
//! row itself.

use crate::auth::principal::Principal;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::store::{
    RefreshTokenStore, StoreProvider, StoreSession, StoredRefreshToken, TransactionCoordinator,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug)]
struct Row {
    token: RefreshToken,
    held_by: Option<u64>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Uuid, Row>,
    principals: HashMap<Uuid, Principal>,
    /// Families revoked while one of their rows was held, with the revocation time.
    revoked_while_held: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    next_session: AtomicU64,
    unavailable: AtomicBool,
    failing_revocations: AtomicUsize,
    revocation_attempts: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .expect("store mutex should not be poisoned")
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::PoolError("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_principal(&self, principal: Principal) {
        self.shared.lock().principals.insert(principal.id, principal);
    }

    /// Makes every subsequent `open` fail, as a dead pool would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `mark_family_revoked` fail.
    pub fn fail_next_revocations(&self, count: usize) {
        self.shared.failing_revocations.store(count, Ordering::SeqCst);
    }

    pub fn revocation_attempts(&self) -> usize {
        self.shared.revocation_attempts.load(Ordering::SeqCst)
    }

    /// Committed state of the row with this hash.
    pub fn token_by_hash(&self, hash: &str) -> Option<RefreshToken> {
        self.shared
            .lock()
            .rows
            .values()
            .find(|row| row.token.token_hash == hash)
            .map(|row| row.token.clone())
    }

    pub fn tokens(&self) -> Vec<RefreshToken> {
        let mut tokens: Vec<_> = self
            .shared
            .lock()
            .rows
            .values()
            .map(|row| row.token.clone())
            .collect();
        tokens.sort_by_key(|token| token.created_at);
        tokens
    }

    pub fn insert_committed(&self, token: RefreshToken) {
        self.shared.lock().rows.insert(
            token.id,
            Row {
                token,
                held_by: None,
            },
        );
    }
}

impl StoreProvider for InMemoryStore {
    fn open(&self) -> Result<Box<dyn StoreSession>, RepositoryError> {
        self.shared.check_available()?;
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession {
            shared: Arc::clone(&self.shared),
            id,
            in_transaction: false,
            staged: Vec::new(),
            held: Vec::new(),
        }))
    }
}

pub struct InMemorySession {
    shared: Arc<Shared>,
    id: u64,
    in_transaction: bool,
    staged: Vec<RefreshToken>,
    held: Vec<(Uuid, String, DateTime<Utc>)>,
}

impl InMemorySession {
    fn release(&mut self, tables: &mut Tables) {
        for (token_id, _, _) in self.held.drain(..) {
            if let Some(row) = tables.rows.get_mut(&token_id) {
                row.held_by = None;
                // The waiting revocation now reaches the row it was blocked on
                if let Some(at) = tables.revoked_while_held.remove(&row.token.family_id) {
                    row.token.revoked_at = Some(at);
                }
            }
        }
        self.staged.clear();
    }
}

impl RefreshTokenStore for InMemorySession {
    fn insert(&mut self, token: &NewRefreshToken) -> Result<(), RepositoryError> {
        let mut tables = self.shared.lock();
        let duplicate = tables
            .rows
            .values()
            .map(|row| &row.token)
            .chain(self.staged.iter())
            .any(|existing| existing.token_hash == token.token_hash);
        if duplicate {
            return Err(RepositoryError::UniqueViolation(
                "refresh_tokens_token_hash_key".to_string(),
            ));
        }

        let row = RefreshToken::from(token.clone());
        if self.in_transaction {
            self.staged.push(row);
        } else {
            tables.rows.insert(
                row.id,
                Row {
                    token: row,
                    held_by: None,
                },
            );
        }
        Ok(())
    }

    fn find_by_hash(&mut self, hash: &str) -> Result<Option<StoredRefreshToken>, RepositoryError> {
        let tables = self.shared.lock();
        let token = tables
            .rows
            .values()
            .map(|row| &row.token)
            .chain(self.staged.iter())
            .find(|token| token.token_hash == hash)
            .cloned();

        Ok(token.and_then(|token| {
            tables
                .principals
                .get(&token.user_id)
                .cloned()
                .map(|principal| StoredRefreshToken { token, principal })
        }))
    }

    fn find_latest_active_by_family(
        &mut self,
        family_id: Uuid,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        let tables = self.shared.lock();
        Ok(tables
            .rows
            .values()
            .map(|row| &row.token)
            .chain(self.staged.iter())
            .filter(|token| token.family_id == family_id && token.revoked_at.is_none())
            .max_by_key(|token| token.created_at)
            .cloned())
    }

    fn mark_family_revoked(
        &mut self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        self.shared.revocation_attempts.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .shared
            .failing_revocations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RepositoryError::DatabaseError(
                "injected revocation failure".to_string(),
            ));
        }

        let mut tables = self.shared.lock();
        let mut count = 0;
        let mut deferred = false;
        for row in tables.rows.values_mut() {
            if row.token.family_id != family_id || row.token.revoked_at.is_some() {
                continue;
            }
            if row.held_by.is_some() {
                deferred = true;
            } else {
                row.token.revoked_at = Some(now);
            }
            count += 1;
        }
        if deferred {
            tables.revoked_while_held.insert(family_id, now);
        }
        Ok(count)
    }

    fn mark_replaced(
        &mut self,
        token_id: Uuid,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        let mut tables = self.shared.lock();
        let Some(row) = tables.rows.get_mut(&token_id) else {
            return Ok(0);
        };

        let claimable = row.token.revoked_at.is_none()
            && row.token.replaced_by_hash.is_none()
            && row.held_by.is_none();
        if !claimable {
            return Ok(0);
        }

        if self.in_transaction {
            row.held_by = Some(self.id);
            self.held.push((token_id, new_hash.to_string(), now));
        } else {
            row.token.revoked_at = Some(now);
            row.token.replaced_by_hash = Some(new_hash.to_string());
        }
        Ok(1)
    }

    fn purge_expired_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut tables = self.shared.lock();
        let before = tables.rows.len();
        tables
            .rows
            .retain(|_, row| row.held_by.is_some() || row.token.expires_at >= cutoff);
        Ok(before - tables.rows.len())
    }
}

impl TransactionCoordinator for InMemorySession {
    fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.in_transaction {
            return Err(RepositoryError::TransactionState(
                "transaction already open".to_string(),
            ));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RepositoryError> {
        if !self.in_transaction {
            return Err(RepositoryError::TransactionState(
                "no open transaction".to_string(),
            ));
        }
        self.in_transaction = false;
        let shared = Arc::clone(&self.shared);
        if let Err(e) = shared.check_available() {
            self.release(&mut shared.lock());
            return Err(e);
        }

        let mut guard = shared.lock();
        let tables = &mut *guard;
        let mut revoked_families: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for (token_id, new_hash, now) in self.held.drain(..) {
            if let Some(row) = tables.rows.get_mut(&token_id) {
                row.held_by = None;
                row.token.revoked_at = Some(now);
                row.token.replaced_by_hash = Some(new_hash);
                if let Some(at) = tables.revoked_while_held.remove(&row.token.family_id) {
                    revoked_families.insert(row.token.family_id, at);
                }
            }
        }
        for mut token in self.staged.drain(..) {
            // Postgres reaches these on the revocation's next pass
            if let Some(at) = revoked_families.get(&token.family_id) {
                token.revoked_at.get_or_insert(*at);
            }
            tables.rows.insert(
                token.id,
                Row {
                    token,
                    held_by: None,
                },
            );
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RepositoryError> {
        if !self.in_transaction {
            return Err(RepositoryError::TransactionState(
                "no open transaction".to_string(),
            ));
        }
        self.in_transaction = false;

        let shared = Arc::clone(&self.shared);
        let mut tables = shared.lock();
        self.release(&mut tables);
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        if self.in_transaction {
            let shared = Arc::clone(&self.shared);
            let mut tables = shared.lock();
            self.release(&mut tables);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seeded() -> (InMemoryStore, RefreshToken) {
        let store = InMemoryStore::new();
        let principal = Principal::new(Uuid::new_v4(), "memory@example.com");
        let now = Utc::now();
        let token = RefreshToken::from(NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: principal.id,
            token_hash: "seed".to_string(),
            family_id: Uuid::new_v4(),
            expires_at: now + Duration::minutes(10),
            family_expires_at: now + Duration::minutes(30),
            created_at: now,
            user_agent: None,
            ip_address: None,
        });
        store.add_principal(principal);
        store.insert_committed(token.clone());
        (store, token)
    }

    #[test]
    fn held_row_rejects_competing_replace_until_rollback() {
        let (store, token) = seeded();
        let mut first = store.open().expect("open");
        let mut second = store.open().expect("open");

        first.begin().expect("begin");
        assert_eq!(first.mark_replaced(token.id, "next-1", Utc::now()).expect("cas"), 1);

        second.begin().expect("begin");
        assert_eq!(second.mark_replaced(token.id, "next-2", Utc::now()).expect("cas"), 0);
        second.rollback().expect("rollback");

        first.rollback().expect("rollback");
        let mut third = store.open().expect("open");
        assert_eq!(third.mark_replaced(token.id, "next-3", Utc::now()).expect("cas"), 1);
    }

    #[test]
    fn staged_insert_is_invisible_to_other_sessions_until_commit() {
        let (store, token) = seeded();
        let mut writer = store.open().expect("open");
        let mut reader = store.open().expect("open");

        writer.begin().expect("begin");
        let mut next = NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: "next".to_string(),
            family_id: token.family_id,
            expires_at: token.expires_at,
            family_expires_at: token.family_expires_at,
            created_at: Utc::now(),
            user_agent: None,
            ip_address: None,
        };
        writer.insert(&next).expect("insert");
        assert!(reader.find_by_hash("next").expect("query").is_none());

        writer.commit().expect("commit");
        assert!(reader.find_by_hash("next").expect("query").is_some());

        next.id = Uuid::new_v4();
        assert!(matches!(
            reader.insert(&next),
            Err(RepositoryError::UniqueViolation(_))
        ));
    }

    #[test]
    fn dropping_an_open_session_releases_its_hold() {
        let (store, token) = seeded();
        {
            let mut abandoned = store.open().expect("open");
            abandoned.begin().expect("begin");
            abandoned
                .mark_replaced(token.id, "lost", Utc::now())
                .expect("cas");
        }

        let stored = store.token_by_hash("seed").expect("row");
        assert!(stored.replaced_by_hash.is_none());
        let mut session = store.open().expect("open");
        assert_eq!(session.mark_replaced(token.id, "kept", Utc::now()).expect("cas"), 1);
    }

    fn successor_of(token: &RefreshToken, hash: &str) -> NewRefreshToken {
        NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: hash.to_string(),
            family_id: token.family_id,
            expires_at: token.expires_at,
            family_expires_at: token.family_expires_at,
            created_at: Utc::now(),
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn family_revoked_during_rotation_takes_the_committed_successor() {
        let (store, token) = seeded();
        let mut rotation = store.open().expect("open");
        rotation.begin().expect("begin");
        rotation.insert(&successor_of(&token, "next")).expect("insert");
        assert_eq!(rotation.mark_replaced(token.id, "next", Utc::now()).expect("cas"), 1);

        let mut logout = store.open().expect("open");
        assert_eq!(
            logout.mark_family_revoked(token.family_id, Utc::now()).expect("revoke"),
            1
        );
        rotation.commit().expect("commit");

        let seed = store.token_by_hash("seed").expect("row");
        assert_eq!(seed.replaced_by_hash.as_deref(), Some("next"));
        let next = store.token_by_hash("next").expect("row");
        assert!(next.revoked_at.is_some());
        assert!(!next.is_active(Utc::now()));
    }

    #[test]
    fn family_revoked_during_rotation_takes_the_row_on_rollback() {
        let (store, token) = seeded();
        let mut rotation = store.open().expect("open");
        rotation.begin().expect("begin");
        rotation.insert(&successor_of(&token, "next")).expect("insert");
        rotation.mark_replaced(token.id, "next", Utc::now()).expect("cas");

        let mut logout = store.open().expect("open");
        logout.mark_family_revoked(token.family_id, Utc::now()).expect("revoke");
        rotation.rollback().expect("rollback");

        let seed = store.token_by_hash("seed").expect("row");
        assert!(seed.revoked_at.is_some());
        assert!(seed.replaced_by_hash.is_none());
        assert!(store.token_by_hash("next").is_none());
    }

    #[test]
    fn injected_revocation_failures_run_out() {
        let (store, token) = seeded();
        store.fail_next_revocations(1);
        let mut session = store.open().expect("open");

        assert!(session.mark_family_revoked(token.family_id, Utc::now()).is_err());
        assert_eq!(
            session.mark_family_revoked(token.family_id, Utc::now()).expect("revoke"),
            1
        );
        assert_eq!(store.revocation_attempts(), 2);
    }

    #[test]
    fn purge_removes_only_rows_expired_before_cutoff() {
        let (store, token) = seeded();
        let mut session = store.open().expect("open");

        assert_eq!(session.purge_expired_before(token.expires_at).expect("purge"), 0);
        assert_eq!(
            session
                .purge_expired_before(token.expires_at + Duration::seconds(1))
                .expect("purge"),
            1
        );
        assert!(store.tokens().is_empty());
    }

    #[test]
    fn commit_without_begin_is_a_state_error() {
        let (store, _) = seeded();
        let mut session = store.open().expect("open");
        assert!(matches!(
            session.commit(),
            Err(RepositoryError::TransactionState(_))
        ));
    }
}
