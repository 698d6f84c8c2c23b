use axum::{extract::Extension, Json};
use std::sync::Arc;

use crate::{
    api::{ApiError, AppContext},
    store::ProductType,
};

#[utoipa::path(
    get,
    path = "/product-types",
    responses (
        (status = 200, description = "All product types", body = [ProductType]),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn list(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<Json<Vec<ProductType>>, ApiError> {
    Ok(Json(ctx.backend.inventory.list_product_types().await?))
}
