//! Organization directory adapters.
//!
//! Both fail closed: any error while answering "does this organization
//! exist?" is logged and reported as `false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use netdesk_auth::OrganizationDirectory;
use netdesk_core::{DomainError, OrganizationId};
use netdesk_organizations::OrganizationStore;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("organization service unreachable: {0}")]
    Transport(String),

    #[error("organization service answered {0}")]
    Status(u16),

    #[error("unexpected organization service response: {0}")]
    Body(String),
}

impl From<DirectoryError> for DomainError {
    fn from(value: DirectoryError) -> Self {
        DomainError::service(value.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ExistsBody {
    exists: bool,
}

/// Accepts both the bare `{"exists": ..}` body and the success envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExistsResponse {
    Enveloped { data: ExistsBody },
    Bare(ExistsBody),
}

impl ExistsResponse {
    fn exists(self) -> bool {
        match self {
            ExistsResponse::Enveloped { data } | ExistsResponse::Bare(data) => data.exists,
        }
    }
}

/// Directory backed by the organization service's HTTP existence endpoint.
#[derive(Debug, Clone)]
pub struct HttpOrganizationDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrganizationDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, id: OrganizationId) -> String {
        format!("{}/api/v1/organizations/{}/exists", self.base_url, id)
    }

    /// The raw lookup, with errors surfaced.
    pub async fn lookup(&self, id: OrganizationId) -> Result<bool, DirectoryError> {
        let response = self
            .client
            .get(self.url(id))
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Body(e.to_string()))?;
        Ok(body.exists())
    }
}

#[async_trait]
impl OrganizationDirectory for HttpOrganizationDirectory {
    #[tracing::instrument(skip(self), fields(organization_id = %id))]
    async fn exists(&self, id: OrganizationId) -> bool {
        match self.lookup(id).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(error = %err, "organization lookup failed; treating as missing");
                false
            }
        }
    }
}

/// Directory answered from the organization store in this process.
pub struct LocalOrganizationDirectory {
    store: Arc<dyn OrganizationStore>,
}

impl LocalOrganizationDirectory {
    pub fn new(store: Arc<dyn OrganizationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OrganizationDirectory for LocalOrganizationDirectory {
    async fn exists(&self, id: OrganizationId) -> bool {
        match self.store.exists(id).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(organization_id = %id, error = %err, "organization lookup failed; treating as missing");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::Utc;
    use netdesk_organizations::{InMemoryOrganizationStore, NewOrganization, OrgType};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn known() -> OrganizationId {
        OrganizationId::from_uuid(uuid::Uuid::from_u128(7))
    }

    async fn fake_service() -> String {
        let known = known();
        let router = Router::new().route(
            "/api/v1/organizations/:id/exists",
            get(move |Path(id): Path<OrganizationId>| async move {
                Json(serde_json::json!({"success": true, "data": {"exists": id == known}}))
            }),
        );
        serve(router).await
    }

    #[tokio::test]
    async fn answers_from_the_remote_service() {
        let base = fake_service().await;
        let dir = HttpOrganizationDirectory::new(base, Duration::from_secs(2)).unwrap();
        assert!(dir.exists(known()).await);
        assert!(!dir.exists(OrganizationId::new()).await);
    }

    #[tokio::test]
    async fn bare_body_is_understood() {
        let router = Router::new().route(
            "/api/v1/organizations/:id/exists",
            get(|| async { Json(serde_json::json!({"exists": true})) }),
        );
        let dir = HttpOrganizationDirectory::new(serve(router).await, Duration::from_secs(2)).unwrap();
        assert!(dir.lookup(OrganizationId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_service_fails_closed() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = HttpOrganizationDirectory::new(format!("http://{addr}"), Duration::from_secs(1)).unwrap();
        assert!(matches!(dir.lookup(known()).await, Err(DirectoryError::Transport(_))));
        assert!(!dir.exists(known()).await);
    }

    #[tokio::test]
    async fn slow_service_times_out_closed() {
        let router = Router::new().route(
            "/api/v1/organizations/:id/exists",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({"exists": true}))
            }),
        );
        let dir = HttpOrganizationDirectory::new(serve(router).await, Duration::from_millis(200)).unwrap();
        assert!(!dir.exists(known()).await);
    }

    #[tokio::test]
    async fn server_errors_and_garbage_fail_closed() {
        let router = Router::new()
            .route(
                "/broken/api/v1/organizations/:id/exists",
                get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/garbage/api/v1/organizations/:id/exists",
                get(|| async { "not json" }),
            );
        let base = serve(router).await;

        let broken = HttpOrganizationDirectory::new(format!("{base}/broken"), Duration::from_secs(2)).unwrap();
        assert!(matches!(broken.lookup(known()).await, Err(DirectoryError::Status(500))));
        assert!(!broken.exists(known()).await);

        let garbage = HttpOrganizationDirectory::new(format!("{base}/garbage"), Duration::from_secs(2)).unwrap();
        assert!(matches!(garbage.lookup(known()).await, Err(DirectoryError::Body(_))));
        assert!(!garbage.exists(known()).await);
    }

    #[tokio::test]
    async fn local_directory_reads_the_store() {
        let store = Arc::new(InMemoryOrganizationStore::new());
        let new = NewOrganization {
            name: "Kazi Telecom".into(),
            code: "KTL".into(),
            org_type: OrgType::Isp,
            email: "noc@ktl.com.bd".into(),
            phone: "01700000000".into(),
            mobile: None,
            website: None,
            address: "Road 2".into(),
            city: "Dhaka".into(),
            postal_code: "1212".into(),
            country: "Bangladesh".into(),
            trade_license: None,
            tin_number: None,
            registration_number: None,
            currency: "BDT".into(),
            revenue_sharing_enabled: true,
            shares: None,
        };
        let org = store.insert(new.into_organization(None, Utc::now())).await.unwrap();

        let dir = LocalOrganizationDirectory::new(store);
        assert!(dir.exists(org.id).await);
        assert!(!dir.exists(OrganizationId::new()).await);
    }
}
