use async_trait::async_trait;

use netdesk_core::OrganizationId;

/// Authoritative answer to "does this tenant exist?".
///
/// Injected wherever a user or role is bound to an organization. Adapters
/// range from an HTTP client for the organization service to an in-process
/// lookup; all of them fail closed.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// `false` for unknown ids and for any lookup failure.
    async fn exists(&self, id: OrganizationId) -> bool;
}
