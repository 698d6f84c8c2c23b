use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::present;
use crate::{
    api::{ApiError, AppContext},
    auth::{Identity, LoginSuccess},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct LoginRequest {
    email: Option<String>,
    #[schema(format = Password)]
    password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[schema(format = Password)]
    new_password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Session issued", body = LoginSuccess),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials or account locked"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(ctx): Extension<Arc<AppContext>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginSuccess>, ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let (Some(email), Some(password)) = (present(request.email), present(request.password))
    else {
        return Err(ApiError::validation("Email and password are required"));
    };

    Ok(Json(ctx.login.login(&email, &password).await?))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses (
        (status = 200, description = "Password updated"),
        (status = 400, description = "Password missing"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(account_id = %identity.account_id))]
pub async fn change_password(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Json<Value>, ApiError> {
    let new_password = payload.and_then(|Json(request)| request.new_password);

    ctx.rotation
        .rotate(identity.account_id, new_password.as_deref())
        .await?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}
