use crate::auth::principal::Principal;
use crate::db::error::RepositoryError;
use crate::db::models::user::User;
use crate::db::schema::{user_claims, user_roles, users};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

pub struct UserRepository;

impl UserRepository {
    pub fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<User>, RepositoryError> {
        users::table
            .filter(users::email.eq(email.trim().to_lowercase()))
            .select(User::as_select())
            .first::<User>(conn)
            .optional()
            .map_err(Into::into)
    }

    /// Charge les rôles et claims pour construire le `Principal`
    pub fn load_principal(conn: &mut PgConnection, user: User) -> Result<Principal, RepositoryError> {
        let roles = user_roles::table
            .filter(user_roles::user_id.eq(user.id))
            .order_by(user_roles::role.asc())
            .select(user_roles::role)
            .load::<String>(conn)?;

        let claims = user_claims::table
            .filter(user_claims::user_id.eq(user.id))
            .select((user_claims::claim_type, user_claims::claim_value))
            .load::<(String, String)>(conn)?;

        Ok(user.into_principal(roles, claims))
    }

    /// Mettre à jour le dernier login
    pub fn update_last_login(
        conn: &mut PgConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        diesel::update(users::table.filter(users::id.eq(id)))
            .set((users::last_login_at.eq(Some(at)), users::updated_at.eq(at)))
            .execute(conn)?;

        Ok(())
    }
}
