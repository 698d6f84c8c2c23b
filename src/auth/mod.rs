//! Authentication and authorization core.
//!
//! Flow Overview: `LoginProcess` checks credentials against the account store,
//! applies the lockout policy and issues a session through `TokenCodec`.
//! `AccessGate` verifies that session on every protected request and enforces
//! the pending rotation flag and the route's role set. `PasswordRotation`
//! clears the flag.

pub mod credentials;
pub mod error;
pub mod gate;
pub mod login;
pub mod role;
pub mod rotation;
pub mod token;

pub use credentials::{CredentialError, CredentialVault};
pub use error::AuthError;
pub use gate::{
    bearer_token, require_session, AccessGate, Identity, RouteGuard, ADMINS, ANY_AUTHENTICATED,
    CHANGE_PASSWORD_PATH, READERS, WRITERS,
};
pub use login::{LoginProcess, LoginSuccess, LOCKOUT_DURATION, MAX_FAILED_ATTEMPTS};
pub use role::{Role, UnknownRole};
pub use rotation::PasswordRotation;
pub use token::{SessionClaims, SessionIdentity, TokenCodec, TokenError, SESSION_TTL_SECS};
