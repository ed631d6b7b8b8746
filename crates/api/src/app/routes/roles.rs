use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};

use netdesk_auth::permissions;
use netdesk_auth::{AssignRequest, NewRole, RoleUpdate};
use netdesk_core::RoleId;

use crate::app::dto::{self, CountResponse, RoleQuery};
use crate::app::errors::ApiResult;
use crate::app::extract::{parse_id, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/permissions", get(permission_catalogue))
        .route("/assign", post(assign))
        .route("/:id", get(get_role).patch(update_role).delete(delete_role))
        .route("/:id/users", get(role_users))
        .route("/:id/user-count", get(user_count))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiQuery(query): ApiQuery<RoleQuery>,
) -> ApiResult<Response> {
    let roles = services
        .roles
        .list_roles(&caller.principal, query.into_filter())
        .await?;
    Ok(dto::ok(roles))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiJson(body): ApiJson<NewRole>,
) -> ApiResult<Response> {
    let role = services.roles.create_role(&caller.principal, body).await?;
    Ok(dto::created("Role created successfully", role))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: RoleId = parse_id(&id)?;
    Ok(dto::ok(services.roles.get_role(&caller.principal, id).await?))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RoleUpdate>,
) -> ApiResult<Response> {
    let id: RoleId = parse_id(&id)?;
    let role = services
        .roles
        .update_role(&caller.principal, id, body)
        .await?;
    Ok(dto::ok_with_message("Role updated successfully", role))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: RoleId = parse_id(&id)?;
    services.roles.delete_role(&caller.principal, id).await?;
    Ok(dto::message("Role deleted successfully"))
}

pub async fn role_users(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: RoleId = parse_id(&id)?;
    let holders = services
        .roles
        .list_users_for_role(&caller.principal, id)
        .await?;
    Ok(dto::ok(holders))
}

pub async fn user_count(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: RoleId = parse_id(&id)?;
    let count = services.roles.user_count(&caller.principal, id).await?;
    Ok(dto::ok(CountResponse { count }))
}

/// Requires a caller but no particular permission.
pub async fn permission_catalogue(_caller: Authenticated) -> ApiResult<Response> {
    Ok(dto::ok(permissions::catalogue()))
}

pub async fn assign(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiJson(body): ApiJson<AssignRequest>,
) -> ApiResult<Response> {
    let change = services
        .roles
        .change_assignment(&caller.principal, body)
        .await?;
    let message = match (change.changed, change.action) {
        (true, action) => format!("Role {action} successfully"),
        (false, "assigned") => "User already has this role".to_string(),
        (false, _) => "User does not have this role".to_string(),
    };
    Ok(dto::ok_with_message(message, change))
}
