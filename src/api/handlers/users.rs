use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{parse_id, present, valid_email};
use crate::{
    api::{ApiError, AppContext},
    auth::{Identity, Role},
    store::{Account, AccountId, AccountSummary, NewAccount, StoreError},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct CreateUserRequest {
    email: Option<String>,
    /// Temporary password; the account must change it on first use.
    #[schema(format = Password)]
    password: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct ResetPasswordRequest {
    #[schema(format = Password)]
    password: Option<String>,
}

/// A freshly created account, without its password digest.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    id: AccountId,
    email: String,
    name: String,
    role: Role,
    must_change_password: bool,
    created_at: DateTime<Utc>,
}

impl From<Account> for CreatedUser {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
            must_change_password: account.must_change_password,
            created_at: account.created_at,
        }
    }
}

struct ValidUser {
    email: String,
    password: String,
    name: String,
    role: Role,
}

impl CreateUserRequest {
    fn validate(self) -> Result<ValidUser, ApiError> {
        let (Some(email), Some(password), Some(name), Some(role)) = (
            present(self.email),
            present(self.password),
            present(self.name),
            present(self.role),
        ) else {
            return Err(ApiError::validation(
                "Missing required fields (email, password, name, role)",
            ));
        };

        if !valid_email(&email) {
            return Err(ApiError::validation("Invalid email"));
        }

        let role = role
            .parse::<Role>()
            .map_err(|_| ApiError::validation("Invalid role"))?;

        Ok(ValidUser {
            email,
            password,
            name,
            role,
        })
    }
}

#[utoipa::path(
    get,
    path = "/users",
    responses (
        (status = 200, description = "All accounts, newest first", body = [AccountSummary]),
        (status = 403, description = "Caller is not an administrator"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<Json<Vec<AccountSummary>>, ApiError> {
    Ok(Json(ctx.backend.accounts.list().await?))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses (
        (status = 200, description = "Account created with a pending password change", body = CreatedUser),
        (status = 400, description = "Missing field, invalid role or email already registered"),
        (status = 403, description = "Caller is not an administrator"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(account_id = %identity.account_id))]
pub async fn create(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<Json<CreatedUser>, ApiError> {
    let user = payload
        .map(|Json(request)| request)
        .unwrap_or_default()
        .validate()?;

    if ctx.backend.accounts.find_by_email(&user.email).await?.is_some() {
        return Err(ApiError::validation("Email already registered"));
    }

    let password_hash = ctx
        .vault
        .hash_blocking(&user.password)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let created = ctx
        .backend
        .accounts
        .create(NewAccount {
            email: user.email,
            name: user.name,
            password_hash,
            role: user.role,
        })
        .await;

    match created {
        Ok(account) => {
            info!(created_id = %account.id, role = %account.role, "Account created");
            Ok(Json(account.into()))
        }
        // Lost a race with a concurrent create for the same e-mail.
        Err(StoreError::Conflict(_)) => Err(ApiError::validation("Email already registered")),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    put,
    path = "/users/{id}/password",
    params(("id" = i64, Path, description = "Account id")),
    request_body = ResetPasswordRequest,
    responses (
        (status = 200, description = "Password reset; the account must change it on next use"),
        (status = 400, description = "Non-numeric id or missing password"),
        (status = 404, description = "No such account"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all, fields(account_id = %identity.account_id))]
pub async fn reset_password(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<Value>, ApiError> {
    let target = AccountId::new(parse_id(&id)?);
    let password = payload
        .and_then(|Json(request)| present(request.password))
        .ok_or_else(|| ApiError::validation("Password is required"))?;

    let password_hash = ctx
        .vault
        .hash_blocking(&password)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    if !ctx
        .backend
        .accounts
        .reset_password(target, &password_hash)
        .await?
    {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!(target_id = %target, "Password reset by administrator");
    Ok(Json(json!({ "message": "Password reset" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: Some("new@example.com".to_string()),
            password: Some("temporary".to_string()),
            name: Some("New User".to_string()),
            role: Some(role.to_string()),
        }
    }

    #[test]
    fn all_fields_are_required() {
        let mut missing = request("VIEWER");
        missing.name = Some(String::new());
        assert!(matches!(missing.validate(), Err(ApiError::Validation(_))));
        assert!(matches!(
            CreateUserRequest::default().validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn role_must_be_known() {
        assert!(matches!(
            request("OWNER").validate(),
            Err(ApiError::Validation(msg)) if msg == "Invalid role"
        ));
        assert!(matches!(request("EDITOR").validate(), Ok(user) if user.role == Role::Editor));
    }

    #[test]
    fn email_must_look_like_one() {
        let mut bad = request("VIEWER");
        bad.email = Some("not-an-email".to_string());
        assert!(matches!(
            bad.validate(),
            Err(ApiError::Validation(msg)) if msg == "Invalid email"
        ));
    }
}
