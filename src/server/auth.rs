//! Gate for the operator endpoints.

use axum::http::{header, HeaderMap};

/// Decides whether a request comes from an administrator.
pub trait Authorizer: Send + Sync {
    fn is_admin(&self, headers: &HeaderMap) -> bool;
}

/// Accepts `Authorization: Bearer <secret>` for one configured secret.
/// With no secret configured nobody is an administrator.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthorizer {
    secret: Option<String>,
}

impl BearerTokenAuthorizer {
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        BearerTokenAuthorizer { secret }
    }
}

impl Authorizer for BearerTokenAuthorizer {
    fn is_admin(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.secret else {
            return false;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == secret)
    }
}
