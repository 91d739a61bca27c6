use crate::db::error::RepositoryError;
use crate::db::models::login_attempt::NewLoginAttempt;
use crate::db::schema::login_attempts;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

pub struct LoginAttemptRepository;

impl LoginAttemptRepository {
    /// Créer une tentative de login
    pub fn create(
        conn: &mut PgConnection,
        attempt: &NewLoginAttempt<'_>,
    ) -> Result<(), RepositoryError> {
        diesel::insert_into(login_attempts::table)
            .values(attempt)
            .execute(conn)?;

        Ok(())
    }

    /// Compter les tentatives échouées pour un user dans la fenêtre donnée
    pub fn count_failed_attempts(
        conn: &mut PgConnection,
        user_id: Uuid,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        login_attempts::table
            .filter(login_attempts::user_id.eq(user_id))
            .filter(login_attempts::success.eq(false))
            .filter(login_attempts::attempted_at.gt(now - window))
            .count()
            .get_result::<i64>(conn)
            .map_err(Into::into)
    }
}
