use serde::{Deserialize, Serialize};

/// Claims carried by the access token issued by the auth collaborator.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: Option<u64>,
}

/// Request-scoped identity context: who is acting and whether they hold
/// the admin role. Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: Option<String>,
    pub is_admin: bool,
}
