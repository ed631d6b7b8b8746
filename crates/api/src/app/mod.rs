//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter selection and service construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: response envelope and request/query DTOs
//! - `errors.rs`: consistent error responses
//! - `extract.rs`: JSON/query extractors that answer with that envelope

use std::any::Any;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use netdesk_core::Clock;
use netdesk_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices, StartupError};

/// The full HTTP router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        guard: services.guard.clone(),
    };
    let development = services.environment.is_development();

    let app = Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", routes::router())
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));
    request_boundary(app, development)
}

/// Outermost layers: request tracing, panic recovery and, in development,
/// internal error detail in responses.
fn request_boundary(mut app: Router, development: bool) -> Router {
    if development {
        app = app.layer(axum::middleware::map_response(errors::reveal_internal_detail));
    }
    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
                errors::panic_response(panic, development)
            })),
    )
}

/// Build services from config and return the router (entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Router, StartupError> {
    let services = Arc::new(build_services(config, clock).await?);
    Ok(router(services))
}
