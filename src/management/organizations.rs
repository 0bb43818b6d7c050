//! Organization management.

use serde::Serialize;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::management::models::{Organization, Organizations, PostOrganizationRequest};

/// Handle for `/api/v2/orgs`.
#[derive(Clone)]
pub struct OrganizationsApi {
    client: Client,
}

#[derive(Serialize)]
struct PatchOrganizationRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl OrganizationsApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create an organization.
    pub async fn create(&self, request: &PostOrganizationRequest) -> Result<Organization> {
        self.client.api_post("/api/v2/orgs", request).await
    }

    /// Fetch one organization by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Organization> {
        self.client.api_get(&format!("/api/v2/orgs/{id}"), &[]).await
    }

    /// Fetch one organization by name, if it exists.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let orgs: Organizations = self.client.api_get("/api/v2/orgs", &[("org", name)]).await?;
        Ok(orgs.orgs.into_iter().next())
    }

    /// List all organizations visible to the token.
    pub async fn list(&self) -> Result<Vec<Organization>> {
        let orgs: Organizations = self.client.api_get("/api/v2/orgs", &[]).await?;
        Ok(orgs.orgs)
    }

    /// Update the name and description of an existing organization. The
    /// organization must carry its id.
    pub async fn update(&self, organization: &Organization) -> Result<Organization> {
        let id = organization
            .id
            .as_deref()
            .ok_or_else(|| Error::Validation("organization id is required for update".to_owned()))?;
        let patch = PatchOrganizationRequest {
            name: &organization.name,
            description: organization.description.as_deref(),
        };
        self.client
            .api_patch(&format!("/api/v2/orgs/{id}"), &patch)
            .await
    }

    /// Delete an organization by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.api_delete(&format!("/api/v2/orgs/{id}")).await
    }
}
