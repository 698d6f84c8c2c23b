//! # Stockroom (inventory backend)
//!
//! `stockroom` serves a small inventory catalog (products, product types, users)
//! behind a single authentication and authorization gate.
//!
//! ## Login and lockout
//!
//! Accounts log in with e-mail and password. Three consecutive failures lock the
//! account for 60 seconds; while locked, every attempt is refused without checking
//! the password. Unknown e-mails get the same generic answer as a wrong password.
//!
//! ## Sessions
//!
//! A successful login returns an HS256 bearer token valid for 8 hours carrying the
//! account id, its role and the pending-rotation flag. The server keeps no session
//! state; rotating the signing secret invalidates every outstanding token.
//!
//! ## Mandatory rotation
//!
//! Accounts created by an administrator must change their password before anything
//! else. Until they do, every protected route except `/auth/change-password` answers
//! `403 Forbidden`.
//!
//! ## Roles
//!
//! `ADMIN`, `EDITOR` and `VIEWER`. Each protected route declares the roles it
//! accepts; the gate does the rest.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
