use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const ADMIN_ROLE: &str = "ADMIN";

/// JWT claims. `sub` is the assessor id that owns the caller's projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
    pub iat: usize,
    pub token_type: String, // "access" or "refresh"
}

impl Claims {
    pub fn assessor_id(&self) -> &str {
        &self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}
