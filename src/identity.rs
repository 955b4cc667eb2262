//! `IdentityService`: token validation, consumed on every authenticated
//! request. Identity/authentication itself is out of scope; this is
//! only the interface the core depends on.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::models::ActorRole;

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub role: ActorRole,
    pub sme_id: Option<String>,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn validate_token(&self, jwt: &str) -> EngineResult<User>;
}

/// Fixed-identity stand-in for environments without a real identity
/// provider wired in (demo/seed runs, integration tests).
pub struct StaticIdentityService {
    pub user: User,
}

#[async_trait]
impl IdentityService for StaticIdentityService {
    async fn validate_token(&self, _jwt: &str) -> EngineResult<User> {
        Ok(self.user.clone())
    }
}
