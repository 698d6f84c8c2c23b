//! HTTP surface.
//!
//! Flow Overview: every protected route carries its own `RouteGuard` (the
//! shared `AccessGate` plus the route's role set) as a route layer, so the
//! gate runs after routing and before the handler. Handlers receive the
//! caller's `Identity` from the request extensions and the shared
//! `AppContext` from an `Extension` layer.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    response::Response,
    routing::{delete, get, post, put, MethodRouter},
    Extension, Router,
};
use std::{any::Any, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::{
    auth::{
        error::json_error, require_session, AccessGate, CredentialVault, LoginProcess,
        PasswordRotation, Role, RouteGuard, TokenCodec, ADMINS, ANY_AUTHENTICATED, READERS,
        WRITERS,
    },
    store::Backend,
};

pub mod error;
pub mod handlers;
mod openapi;

pub use error::ApiError;
pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Everything a handler needs, built once at startup.
pub struct AppContext {
    pub backend: Backend,
    pub vault: CredentialVault,
    pub login: LoginProcess,
    pub rotation: PasswordRotation,
    pub gate: Arc<AccessGate>,
}

impl AppContext {
    #[must_use]
    pub fn new(backend: Backend, vault: CredentialVault, tokens: TokenCodec) -> Self {
        let login = LoginProcess::new(backend.accounts.clone(), vault.clone(), tokens.clone());
        let rotation = PasswordRotation::new(backend.accounts.clone(), vault.clone());
        Self {
            backend,
            vault,
            login,
            rotation,
            gate: Arc::new(AccessGate::new(tokens)),
        }
    }
}

fn guarded(gate: &Arc<AccessGate>, allowed: &'static [Role], route: MethodRouter) -> MethodRouter {
    route.route_layer(middleware::from_fn_with_state(
        RouteGuard::new(gate.clone(), allowed),
        require_session,
    ))
}

/// Build the application router with its middleware stack.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let gate = &ctx.gate;

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(86_400));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/change-password",
            guarded(gate, ANY_AUTHENTICATED, post(handlers::auth::change_password)),
        )
        .route(
            "/products",
            guarded(gate, READERS, get(handlers::products::list))
                .merge(guarded(gate, WRITERS, post(handlers::products::create))),
        )
        .route(
            "/products/:id",
            guarded(gate, WRITERS, delete(handlers::products::remove)),
        )
        .route(
            "/product-types",
            guarded(gate, READERS, get(handlers::product_types::list)),
        )
        .route(
            "/users",
            guarded(gate, ADMINS, get(handlers::users::list))
                .merge(guarded(gate, ADMINS, post(handlers::users::create))),
        )
        .route(
            "/users/:id/password",
            guarded(gate, ADMINS, put(handlers::users::reset_password)),
        )
        .route(
            "/dashboard",
            guarded(gate, READERS, get(handlers::dashboard::summary)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(cors)
                .layer(Extension(ctx.clone())),
        )
}

/// Start the server and serve until Ctrl-C.
/// # Errors
/// Return error if the listener cannot be bound or the server fails
pub async fn new(port: u16, ctx: Arc<AppContext>) -> Result<()> {
    let app = router(ctx);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {detail}");
    json_error(
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        crate::auth::error::INTERNAL_ERROR_MESSAGE,
    )
}
