use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};

use netdesk_auth::{ChangePassword, NewUser, UserProfileUpdate};
use netdesk_core::UserId;

use crate::app::dto::{self, UserQuery};
use crate::app::errors::ApiResult;
use crate::app::extract::{parse_id, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(profile))
        .route("/me/permissions", get(my_permissions))
        .route("/me/change-password", post(change_password))
        .route(
            "/:id",
            get(get_user).patch(update_user).delete(deactivate_user),
        )
        .route("/:id/roles", get(role_history))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<Response> {
    let users = services
        .accounts
        .list_users(&caller.principal, query.into_filter())
        .await?;
    Ok(dto::ok(users))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiJson(body): ApiJson<NewUser>,
) -> ApiResult<Response> {
    let user = services.accounts.create_user(&caller.principal, body).await?;
    Ok(dto::created("User created successfully", user))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: UserId = parse_id(&id)?;
    Ok(dto::ok(services.accounts.get_user(&caller.principal, id).await?))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UserProfileUpdate>,
) -> ApiResult<Response> {
    let id: UserId = parse_id(&id)?;
    let user = services
        .accounts
        .update_user(&caller.principal, id, body)
        .await?;
    Ok(dto::ok_with_message("User updated successfully", user))
}

pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: UserId = parse_id(&id)?;
    services
        .accounts
        .deactivate_user(&caller.principal, id)
        .await?;
    Ok(dto::message("User deactivated successfully"))
}

pub async fn role_history(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: UserId = parse_id(&id)?;
    let history = services
        .roles
        .assignment_history(&caller.principal, id)
        .await?;
    Ok(dto::ok(history))
}

pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
) -> ApiResult<Response> {
    Ok(dto::ok(services.accounts.profile(&caller.principal).await?))
}

pub async fn my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
) -> ApiResult<Response> {
    Ok(dto::ok(services.accounts.permissions(&caller.principal).await?))
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiJson(body): ApiJson<ChangePassword>,
) -> ApiResult<Response> {
    services
        .accounts
        .change_password(&caller.principal, body)
        .await?;
    Ok(dto::message("Password changed successfully"))
}
