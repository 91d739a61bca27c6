use crate::db::schema::login_attempts;
use chrono::{DateTime, Utc};
use diesel::Insertable;
use uuid::Uuid;

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = login_attempts)]
pub struct NewLoginAttempt<'a> {
    pub user_id: Option<Uuid>,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}
