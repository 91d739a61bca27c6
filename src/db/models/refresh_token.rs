use crate::db::schema::refresh_tokens;
use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use uuid::Uuid;

/// Row staged by the rotation engine. `revoked_at` and `replaced_by_hash`
/// always start out NULL.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub family_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub family_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_hash: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshToken {
    /// Not revoked, and inside both its own and its family's horizon.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now && self.family_expires_at > now
    }

    /// Already consumed by a successful rotation.
    pub fn is_replaced(&self) -> bool {
        self.replaced_by_hash.is_some()
    }
}

impl From<NewRefreshToken> for RefreshToken {
    fn from(new: NewRefreshToken) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            token_hash: new.token_hash,
            family_id: new.family_id,
            expires_at: new.expires_at,
            family_expires_at: new.family_expires_at,
            created_at: new.created_at,
            revoked_at: None,
            replaced_by_hash: None,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
        }
    }
}
