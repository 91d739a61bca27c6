use crate::auth::principal::Principal;
use crate::db::schema::users;
use diesel::{Queryable, Selectable};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub org_id: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: bool,
}

impl User {
    /// Builds the token subject from the row plus its role and claim rows.
    pub fn into_principal(
        self,
        roles: Vec<String>,
        claims: Vec<(String, String)>,
    ) -> Principal {
        Principal {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            org_id: self.org_id,
            roles,
            claims: claims.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }
}
