//! Authorization (API token) management.

use serde::Serialize;

use crate::client::Client;
use crate::error::Result;
use crate::management::models::{Authorization, Authorizations};

/// Handle for `/api/v2/authorizations`.
#[derive(Clone)]
pub struct AuthorizationsApi {
    client: Client,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    status: &'a str,
}

impl AuthorizationsApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create an authorization. The response carries the token secret; it
    /// is not retrievable afterwards.
    pub async fn create(&self, authorization: &Authorization) -> Result<Authorization> {
        self.client
            .api_post("/api/v2/authorizations", authorization)
            .await
    }

    /// Fetch one authorization by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Authorization> {
        self.client
            .api_get(&format!("/api/v2/authorizations/{id}"), &[])
            .await
    }

    /// List all authorizations visible to the token.
    pub async fn list(&self) -> Result<Vec<Authorization>> {
        let auths: Authorizations = self.client.api_get("/api/v2/authorizations", &[]).await?;
        Ok(auths.authorizations)
    }

    /// List authorizations belonging to a user.
    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Authorization>> {
        let auths: Authorizations = self
            .client
            .api_get("/api/v2/authorizations", &[("userID", user_id)])
            .await?;
        Ok(auths.authorizations)
    }

    /// List authorizations belonging to an organization.
    pub async fn find_by_org_id(&self, org_id: &str) -> Result<Vec<Authorization>> {
        let auths: Authorizations = self
            .client
            .api_get("/api/v2/authorizations", &[("orgID", org_id)])
            .await?;
        Ok(auths.authorizations)
    }

    /// Create a new authorization with the same org and permissions as an
    /// existing one. The clone gets its own fresh token secret.
    pub async fn clone_by_id(&self, id: &str) -> Result<Authorization> {
        let source = self.find_by_id(id).await?;
        let cloned = Authorization::new(source.org_id, source.permissions);
        self.create(&cloned).await
    }

    /// Set an authorization `active` or `inactive`.
    pub async fn update_status(&self, id: &str, status: &str) -> Result<Authorization> {
        self.client
            .api_patch(
                &format!("/api/v2/authorizations/{id}"),
                &StatusUpdate { status },
            )
            .await
    }

    /// Delete an authorization by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .api_delete(&format!("/api/v2/authorizations/{id}"))
            .await
    }
}
