//! Session tokens: HS256 JWTs carrying the account id, role and the pending
//! rotation flag. The server keeps no session state; a token lives until `exp`.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::Role;
use crate::store::AccountId;

/// Session lifetime in seconds, counted from issuance.
pub const SESSION_TTL_SECS: i64 = 8 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: AccountId,
    pub role: Role,
    #[serde(rename = "mustChangePassword")]
    pub must_change_password: bool,
    pub iat: i64,
    pub exp: i64,
}

/// What a session asserts about its holder, as of issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub account_id: AccountId,
    pub role: Role,
    pub must_change_password: bool,
}

impl From<&SessionClaims> for SessionIdentity {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            account_id: claims.sub,
            role: claims.role,
            must_change_password: claims.must_change_password,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Rejected(jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec around the process-wide signing secret.
    ///
    /// # Errors
    /// Returns `TokenError::EmptySecret` for an empty secret.
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the caller's clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign a session for `identity`, valid for [`SESSION_TTL_SECS`].
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, identity: SessionIdentity) -> Result<String, TokenError> {
        self.issue_at(identity, Utc::now())
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_at(
        &self,
        identity: SessionIdentity,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub: identity.account_id,
            role: identity.role,
            must_change_password: identity.must_change_password,
            iat: now.timestamp(),
            exp: now.timestamp() + SESSION_TTL_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    /// Decode `token` if its signature is intact and it has not expired.
    ///
    /// # Errors
    /// Any error means the bearer is unauthenticated.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// # Errors
    /// Any error means the bearer is unauthenticated.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Rejected)?;
        if now.timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}
