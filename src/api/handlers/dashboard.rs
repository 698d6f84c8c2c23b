use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::{ApiError, AppContext};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ChartPoint {
    label: String,
    value: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    total_products: i64,
    total_users: i64,
    /// Product count per product type.
    chart_data: Vec<ChartPoint>,
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses (
        (status = 200, description = "Inventory totals", body = Dashboard),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer" = [])),
    tag = "dashboard"
)]
pub async fn summary(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<Json<Dashboard>, ApiError> {
    let inventory = &ctx.backend.inventory;

    let total_products = inventory.count_products().await?;
    let total_users = ctx.backend.accounts.count().await?;
    let chart_data = inventory
        .products_per_type()
        .await?
        .into_iter()
        .map(|count| ChartPoint {
            label: count.name,
            value: count.products,
        })
        .collect();

    Ok(Json(Dashboard {
        total_products,
        total_users,
        chart_data,
    }))
}
