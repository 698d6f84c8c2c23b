use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{auth, dashboard, health, product_types, products, users};
use crate::{
    auth::{LoginSuccess, Role},
    store::{AccountId, AccountProfile, AccountSummary, Product, ProductType},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::change_password,
        products::list,
        products::create,
        products::remove,
        product_types::list,
        users::list,
        users::create,
        users::reset_password,
        dashboard::summary,
    ),
    components(
        schemas(
            health::Health,
            auth::LoginRequest,
            auth::ChangePasswordRequest,
            LoginSuccess,
            AccountProfile,
            AccountSummary,
            AccountId,
            Role,
            products::CreateProductRequest,
            Product,
            ProductType,
            users::CreateUserRequest,
            users::ResetPasswordRequest,
            users::CreatedUser,
            dashboard::Dashboard,
            dashboard::ChartPoint,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Login and password rotation"),
        (name = "products", description = "Inventory catalog"),
        (name = "users", description = "Account administration"),
        (name = "dashboard", description = "Inventory totals"),
        (name = "health", description = "Service status"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/auth/login",
            "/auth/change-password",
            "/products",
            "/products/{id}",
            "/product-types",
            "/users",
            "/users/{id}/password",
            "/dashboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = openapi();
        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }
}
