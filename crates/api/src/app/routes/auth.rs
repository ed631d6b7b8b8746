use std::sync::Arc;

use axum::{body::Bytes, extract::Extension, response::Response, routing::post, Router};

use netdesk_auth::{LoginRequest, LogoutRequest};

use crate::app::dto::{self, LoginResponse, RefreshRequest, TokenResponse, UserEnvelope};
use crate::app::errors::ApiResult;
use crate::app::extract::{optional_json, ApiJson};
use crate::app::services::AppServices;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/verify", post(verify))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = services.auth.login(body).await?;
    Ok(dto::ok_with_message(
        "Login successful",
        LoginResponse {
            user: outcome.user,
            tokens: outcome.tokens.into(),
            remember_me: outcome.remember_me,
        },
    ))
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> ApiResult<Response> {
    let body: RefreshRequest = optional_json(&body)?;
    let pair = services.auth.refresh(body.refresh_token.as_deref()).await?;
    Ok(dto::ok(TokenResponse::from(pair)))
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    body: Bytes,
) -> ApiResult<Response> {
    let body: LogoutRequest = optional_json(&body)?;
    services
        .auth
        .logout(&caller.principal, &caller.token, body)
        .await?;
    Ok(dto::message("Logout successful"))
}

pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
) -> ApiResult<Response> {
    let user = services.auth.verify(&caller.principal).await?;
    Ok(dto::ok(UserEnvelope { user }))
}
