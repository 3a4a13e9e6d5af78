//! Administrator gate in front of every backup route.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::sync::Arc;

pub trait AdminGate: Send + Sync {
    fn is_admin(&self, headers: &HeaderMap) -> bool;
}

/// Accepts `Authorization: Bearer <token>` matching the configured admin token.
/// Without a configured token nobody is admitted.
pub struct TokenGate {
    token: Option<String>,
}

impl TokenGate {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl AdminGate for TokenGate {
    fn is_admin(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return false;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|presented| constant_time_eq(presented.as_bytes(), expected.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor that rejects non-admin callers with 403. Handlers take it first so
/// nothing else about the request is looked at for unauthorized callers.
pub struct RequireAdmin;

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.gate.is_admin(&parts.headers) {
            Ok(RequireAdmin)
        } else {
            tracing::warn!(uri = %parts.uri, "Rejected non-admin request");
            Err(AppError::Forbidden("Administrator access required".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_token_gate() {
        let gate = TokenGate::new(Some("s3cret".into()));
        assert!(gate.is_admin(&headers("Bearer s3cret")));
        assert!(!gate.is_admin(&headers("Bearer s3cre")));
        assert!(!gate.is_admin(&headers("Bearer s3cretX")));
        assert!(!gate.is_admin(&headers("Basic s3cret")));
        assert!(!gate.is_admin(&HeaderMap::new()));
    }

    #[test]
    fn test_unconfigured_gate_denies_everyone() {
        let gate = TokenGate::new(Some(String::new()));
        assert!(!gate.is_admin(&headers("Bearer ")));
        let gate = TokenGate::new(None);
        assert!(!gate.is_admin(&headers("Bearer anything")));
    }
}
