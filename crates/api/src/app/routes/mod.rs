use axum::Router;

pub mod auth;
pub mod organizations;
pub mod roles;
pub mod system;
pub mod users;

/// Router for everything under `/api/v1`.
///
/// Authentication is enforced per handler through the `Authenticated`
/// extractor; the few public endpoints simply don't take it.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/roles", roles::router())
        .nest("/organizations", organizations::router())
}
