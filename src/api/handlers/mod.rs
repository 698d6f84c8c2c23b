pub mod auth;
pub mod dashboard;
pub mod health;
pub mod product_types;
pub mod products;
pub mod users;

// common functions for the handlers
use regex::Regex;

use super::ApiError;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// `Some` only for a non-empty value.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

pub(crate) fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::validation("Invalid id"))
}
