use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{parse_id, present};
use crate::{
    api::{ApiError, AppContext},
    auth::Identity,
    store::{NewProduct, Product, StoreError},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    name: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    expiration: Option<String>,
    /// Number or numeric string.
    #[schema(value_type = Option<i64>)]
    type_id: Option<Value>,
}

/// Accepts a full RFC 3339 timestamp or a plain date (midnight UTC).
fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

fn parse_type_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl CreateProductRequest {
    fn validate(self) -> Result<NewProduct, ApiError> {
        let name = present(self.name).ok_or_else(|| ApiError::validation("Name is required"))?;
        let expiration = present(self.expiration)
            .ok_or_else(|| ApiError::validation("Expiration is required"))?;
        let expiration = parse_expiration(&expiration)
            .ok_or_else(|| ApiError::validation("Invalid expiration date"))?;
        let type_id = self
            .type_id
            .as_ref()
            .ok_or_else(|| ApiError::validation("Product type is required"))?;
        let type_id =
            parse_type_id(type_id).ok_or_else(|| ApiError::validation("Invalid product type"))?;

        Ok(NewProduct {
            name,
            expiration,
            type_id,
        })
    }
}

#[utoipa::path(
    get,
    path = "/products",
    responses (
        (status = 200, description = "All products, newest first", body = [Product]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Password change pending or role not allowed"),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
#[instrument(skip_all)]
pub async fn list(Extension(ctx): Extension<Arc<AppContext>>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(ctx.backend.inventory.list_products().await?))
}

#[utoipa::path(
    post,
    path = "/products",
    request_body = CreateProductRequest,
    responses (
        (status = 200, description = "Product created", body = Product),
        (status = 400, description = "Missing or malformed field"),
        (status = 403, description = "Role not allowed"),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
#[instrument(skip_all, fields(account_id = %identity.account_id))]
pub async fn create(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<CreateProductRequest>>,
) -> Result<Json<Product>, ApiError> {
    let product = payload
        .map(|Json(request)| request)
        .unwrap_or_default()
        .validate()?;

    match ctx.backend.inventory.create_product(product).await {
        Ok(product) => {
            info!(product_id = product.id, "Product created");
            Ok(Json(product))
        }
        Err(StoreError::InvalidReference(_)) => Err(ApiError::validation("Invalid product type")),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "Product id")),
    responses (
        (status = 200, description = "Product deleted"),
        (status = 400, description = "Non-numeric id"),
        (status = 404, description = "No such product"),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
#[instrument(skip_all, fields(account_id = %identity.account_id))]
pub async fn remove(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;

    if !ctx.backend.inventory.delete_product(id).await? {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    info!(product_id = id, "Product deleted");
    Ok(Json(json!({ "message": "Product deleted" })))
}
