use std::collections::BTreeMap;
use uuid::Uuid;

/// The authenticated subject a session is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub org_id: Option<String>,
    pub roles: Vec<String>,
    /// Custom claims copied verbatim into every access token.
    pub claims: BTreeMap<String, String>,
}

impl Principal {
    #[cfg(test)]
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            full_name: None,
            org_id: None,
            roles: Vec::new(),
            claims: BTreeMap::new(),
        }
    }

    /// Org id, if set to something non-blank.
    pub fn organization(&self) -> Option<&str> {
        self.org_id.as_deref().map(str::trim).filter(|org| !org.is_empty())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.full_name.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }
}
