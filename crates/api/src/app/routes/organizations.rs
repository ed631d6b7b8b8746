use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};

use netdesk_core::OrganizationId;
use netdesk_organizations::{
    BillingSettingsUpdate, CommissionRequest, NewOrganization, OrganizationUpdate,
    SyncSettingsUpdate,
};

use crate::app::dto::{self, ExistsResponse, OrganizationQuery};
use crate::app::errors::ApiResult;
use crate::app::extract::{parse_id, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route("/stats", get(stats))
        .route(
            "/:id",
            get(get_organization)
                .patch(update_organization)
                .delete(deactivate_organization),
        )
        .route("/:id/exists", get(exists))
        .route("/:id/verify", post(verify))
        .route(
            "/:id/billing-settings",
            get(billing_settings).patch(update_billing_settings),
        )
        .route(
            "/:id/sync-settings",
            get(sync_settings).patch(update_sync_settings),
        )
        .route("/:id/commission", post(commission))
}

pub async fn list_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiQuery(query): ApiQuery<OrganizationQuery>,
) -> ApiResult<Response> {
    let orgs = services
        .organizations
        .list(&caller.principal, query.into_filter())
        .await?;
    Ok(dto::ok(orgs))
}

pub async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    ApiJson(body): ApiJson<NewOrganization>,
) -> ApiResult<Response> {
    let org = services.organizations.create(&caller.principal, body).await?;
    Ok(dto::created("Organization created successfully", org))
}

pub async fn get_organization(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    Ok(dto::ok(services.organizations.get(&caller.principal, id).await?))
}

pub async fn update_organization(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<OrganizationUpdate>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let org = services
        .organizations
        .update(&caller.principal, id, body)
        .await?;
    Ok(dto::ok_with_message("Organization updated successfully", org))
}

pub async fn deactivate_organization(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    services
        .organizations
        .deactivate(&caller.principal, id)
        .await?;
    Ok(dto::message("Organization deactivated successfully"))
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
) -> ApiResult<Response> {
    Ok(dto::ok(services.organizations.stats(&caller.principal).await?))
}

/// Public: other services check tenants here before binding data to them.
pub async fn exists(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let exists = services.organizations.exists(id).await?;
    Ok(dto::ok(ExistsResponse { exists }))
}

pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let org = services.organizations.verify(&caller.principal, id).await?;
    Ok(dto::ok_with_message("Organization verified successfully", org))
}

pub async fn billing_settings(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let settings = services
        .organizations
        .billing_settings(&caller.principal, id)
        .await?;
    Ok(dto::ok(settings))
}

pub async fn update_billing_settings(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<BillingSettingsUpdate>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let settings = services
        .organizations
        .update_billing_settings(&caller.principal, id, body)
        .await?;
    Ok(dto::ok_with_message("Billing settings updated successfully", settings))
}

pub async fn sync_settings(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let settings = services
        .organizations
        .sync_settings(&caller.principal, id)
        .await?;
    Ok(dto::ok(settings))
}

pub async fn update_sync_settings(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SyncSettingsUpdate>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let settings = services
        .organizations
        .update_sync_settings(&caller.principal, id, body)
        .await?;
    Ok(dto::ok_with_message("Sync settings updated successfully", settings))
}

pub async fn commission(
    Extension(services): Extension<Arc<AppServices>>,
    caller: Authenticated,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommissionRequest>,
) -> ApiResult<Response> {
    let id: OrganizationId = parse_id(&id)?;
    let split = services
        .organizations
        .commission_split(&caller.principal, id, body)
        .await?;
    Ok(dto::ok(split))
}
