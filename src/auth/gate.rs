//! Per-request access control shared by every protected route.
//!
//! Checks run in order and stop at the first failure:
//! 1. bearer token present, else `MissingToken`
//! 2. token verifies, else `InvalidToken`
//! 3. no pending rotation unless the route is [`CHANGE_PASSWORD_PATH`]
//! 4. role is in the route's allowed set (an empty set admits every role)
//!
//! The gate only consults the token; it never reads the account store.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::{token::TokenCodec, AuthError, Role};
use crate::store::AccountId;

/// The only route reachable while a password rotation is pending.
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";

/// Any authenticated role.
pub const ANY_AUTHENTICATED: &[Role] = &[];
pub const READERS: &[Role] = &[Role::Administrator, Role::Editor, Role::Viewer];
pub const WRITERS: &[Role] = &[Role::Administrator, Role::Editor];
pub const ADMINS: &[Role] = &[Role::Administrator];

/// Caller identity handed to handlers behind the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub account_id: AccountId,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    tokens: TokenCodec,
}

impl AccessGate {
    #[must_use]
    pub fn new(tokens: TokenCodec) -> Self {
        Self { tokens }
    }

    /// # Errors
    /// One of `MissingToken`, `InvalidToken`, `MustRotatePassword`, `ForbiddenRole`.
    pub fn authorize(
        &self,
        bearer: Option<&str>,
        path: &str,
        allowed: &[Role],
    ) -> Result<Identity, AuthError> {
        self.authorize_at(bearer, path, allowed, Utc::now())
    }

    /// # Errors
    /// See [`Self::authorize`].
    pub fn authorize_at(
        &self,
        bearer: Option<&str>,
        path: &str,
        allowed: &[Role],
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let token = bearer.ok_or(AuthError::MissingToken)?;

        let claims = self.tokens.verify_at(token, now).map_err(|err| {
            debug!("Rejected bearer token: {err}");
            AuthError::InvalidToken
        })?;

        if claims.must_change_password && path != CHANGE_PASSWORD_PATH {
            return Err(AuthError::MustRotatePassword);
        }

        if !allowed.is_empty() && !allowed.contains(&claims.role) {
            return Err(AuthError::ForbiddenRole);
        }

        Ok(Identity {
            account_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Token carried by the `Authorization` header.
///
/// A header without the `Bearer ` scheme is passed through whole so that it
/// fails verification instead of looking absent.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?;
    let value = value.to_str().unwrap_or_default().trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Some(token.trim()),
        _ => Some(value),
    }
}

/// Gate plus the role set of one route.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    gate: Arc<AccessGate>,
    allowed: &'static [Role],
}

impl RouteGuard {
    #[must_use]
    pub fn new(gate: Arc<AccessGate>, allowed: &'static [Role]) -> Self {
        Self { gate, allowed }
    }
}

/// Middleware that admits the request and stores its [`Identity`] in the extensions.
pub async fn require_session(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = guard.gate.authorize(
        bearer_token(request.headers()),
        request.uri().path(),
        guard.allowed,
    );

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::SessionIdentity;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn gate() -> (AccessGate, TokenCodec) {
        let tokens = match TokenCodec::new(b"gate-test-secret") {
            Ok(tokens) => tokens,
            Err(err) => panic!("codec: {err}"),
        };
        (AccessGate::new(tokens.clone()), tokens)
    }

    fn token(tokens: &TokenCodec, role: Role, must_change_password: bool) -> String {
        match tokens.issue(SessionIdentity {
            account_id: AccountId::new(1),
            role,
            must_change_password,
        }) {
            Ok(token) => token,
            Err(err) => panic!("issue: {err}"),
        }
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let (gate, _) = gate();
        assert_eq!(
            gate.authorize(None, "/products", READERS),
            Err(AuthError::MissingToken)
        );
    }

    #[test]
    fn bad_or_expired_token_is_invalid() {
        let (gate, tokens) = gate();
        assert_eq!(
            gate.authorize(Some("garbage"), "/products", READERS),
            Err(AuthError::InvalidToken)
        );

        let token = token(&tokens, Role::Viewer, false);
        let later = Utc::now() + Duration::hours(9);
        assert_eq!(
            gate.authorize_at(Some(&token), "/products", READERS, later),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn pending_rotation_only_reaches_change_password() {
        let (gate, tokens) = gate();
        for role in [Role::Administrator, Role::Editor, Role::Viewer] {
            let token = token(&tokens, role, true);
            for path in ["/products", "/users", "/dashboard", "/auth/change-password/x"] {
                assert_eq!(
                    gate.authorize(Some(&token), path, ANY_AUTHENTICATED),
                    Err(AuthError::MustRotatePassword)
                );
            }
            assert!(gate
                .authorize(Some(&token), CHANGE_PASSWORD_PATH, ANY_AUTHENTICATED)
                .is_ok());
        }
    }

    #[test]
    fn rotation_check_precedes_role_check() {
        let (gate, tokens) = gate();
        let token = token(&tokens, Role::Viewer, true);
        assert_eq!(
            gate.authorize(Some(&token), "/users", ADMINS),
            Err(AuthError::MustRotatePassword)
        );
    }

    #[test]
    fn role_outside_allowed_set_is_forbidden() {
        let (gate, tokens) = gate();
        let viewer = token(&tokens, Role::Viewer, false);
        assert_eq!(
            gate.authorize(Some(&viewer), "/products", WRITERS),
            Err(AuthError::ForbiddenRole)
        );
        assert!(gate.authorize(Some(&viewer), "/products", READERS).is_ok());

        let editor = token(&tokens, Role::Editor, false);
        assert_eq!(
            gate.authorize(Some(&editor), "/users", ADMINS),
            Err(AuthError::ForbiddenRole)
        );
        let identity = gate.authorize(Some(&editor), "/products", WRITERS);
        assert_eq!(
            identity,
            Ok(Identity {
                account_id: AccountId::new(1),
                role: Role::Editor
            })
        );
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), Some("Basic dXNlcjpwYXNz"));
    }
}
